//! End-to-end supervisor/driver behaviour against a scripted board:
//! command-stream conformance, firmware fallback, cancellation, pause, and
//! disconnect handling.

use plotkit_core::{Device, EventBus, PlotEvent, StepsPerMm, ToolingProfile, Vec2};
use plotkit_device::{EbbDriver, MockTransport, PlotState, PlotSupervisor};
use plotkit_planner::plan;
use std::sync::Arc;
use std::time::Duration;

fn v(x: f64, y: f64) -> Vec2 {
    Vec2::new(x, y)
}

fn supervisor_with(version: &str) -> (PlotSupervisor, MockTransport) {
    let mock = MockTransport::with_version(version);
    let driver = Arc::new(EbbDriver::new(Box::new(mock.clone()), Device::v3()));
    let supervisor = PlotSupervisor::new(driver, EventBus::new());
    (supervisor, mock)
}

fn short_plan() -> plotkit_planner::Plan {
    let device = Device::v3();
    let profile = ToolingProfile::axidraw_fast(&device);
    plan(
        &[vec![v(10.0, 10.0), v(20.0, 10.0)]],
        &profile,
        Vec2::ZERO,
        device.steps_per_mm,
    )
    .unwrap()
}

/// A plan whose draw motion takes long enough to race control messages
/// against it deterministically.
fn zigzag_plan() -> plotkit_planner::Plan {
    let device = Device::v3();
    let profile = ToolingProfile::axidraw_fast(&device);
    let mut path = Vec::new();
    for i in 0..30 {
        let y = if i % 2 == 0 { 10.0 } else { 30.0 };
        path.push(v(10.0 + 5.0 * i as f64, y));
    }
    plan(&[path], &profile, Vec2::ZERO, device.steps_per_mm).unwrap()
}

async fn wait_for_state(supervisor: &PlotSupervisor, target: PlotState) {
    for _ in 0..500 {
        if supervisor.state() == target {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("supervisor never reached {:?}", target);
}

#[tokio::test]
async fn lm_capable_firmware_uses_lm() {
    let (supervisor, mock) = supervisor_with("2.7.0");
    supervisor.plot(short_plan()).await.unwrap();

    let commands = mock.commands();
    assert_eq!(commands[0], "EM,1,1", "stream must begin by enabling motors");
    assert!(
        commands.iter().any(|c| c.starts_with("LM,")),
        "expected at least one LM on 2.7.0 firmware: {:?}",
        commands
    );
    assert!(
        !commands.iter().any(|c| c.starts_with("XM,")),
        "XM fallback must not be used when LM is available"
    );
    assert_eq!(
        commands.last().map(String::as_str),
        Some("SR,60000000,0"),
        "2.6+ firmware parks the servo via SR"
    );
    assert!(commands.iter().any(|c| c == "V"), "version must be queried");
    assert!(commands.iter().any(|c| c == "QM"), "idle wait must poll QM");
}

#[tokio::test]
async fn old_firmware_falls_back_to_xm() {
    let (supervisor, mock) = supervisor_with("2.4.0");
    supervisor.plot(short_plan()).await.unwrap();

    let commands = mock.commands();
    assert_eq!(commands[0], "EM,1,1");
    assert!(
        commands.iter().any(|c| c.starts_with("XM,")),
        "expected XM slices on pre-2.5.3 firmware: {:?}",
        commands
    );
    assert!(!commands.iter().any(|c| c.starts_with("LM,")));
    assert_eq!(
        commands.last().map(String::as_str),
        Some("EM,0,0"),
        "pre-2.6 firmware disables motors directly"
    );
}

#[tokio::test]
async fn pen_motions_use_the_servo_command() {
    let (supervisor, mock) = supervisor_with("2.7.0");
    supervisor.plot(short_plan()).await.unwrap();

    let device = Device::v3();
    let s2: Vec<String> = mock
        .commands()
        .iter()
        .filter(|c| c.starts_with("S2,"))
        .cloned()
        .collect();
    // Pre-plot park, pen drop, pen lift.
    assert_eq!(s2.len(), 3, "unexpected S2 stream: {:?}", s2);
    for cmd in &s2 {
        let pin: u8 = cmd.split(',').nth(2).unwrap().parse().unwrap();
        assert_eq!(pin, device.servo_pin);
    }
}

#[tokio::test]
async fn cancel_mid_plot_homes_and_returns_to_idle() {
    let (supervisor, mock) = supervisor_with("2.7.0");
    let mut events = supervisor.events().receiver();

    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.plot(zigzag_plan()).await });

    // Wait until the draw motion (index 2) is announced, then cancel while
    // its serial commands are still streaming.
    loop {
        match events.recv().await.unwrap() {
            PlotEvent::Progress { motion_idx: 2, .. } => break,
            _ => continue,
        }
    }
    supervisor.cancel();

    handle.await.unwrap().unwrap();
    assert_eq!(supervisor.state(), PlotState::Idle);
    assert!(!supervisor.is_plotting());

    let commands = mock.commands();
    assert!(
        commands.iter().any(|c| c == "HM,4000"),
        "cancel must home the carriage: {:?}",
        commands
    );
    // The pen was down mid-draw; it must come back up before homing.
    let pen_up_idx = commands
        .iter()
        .rposition(|c| c.starts_with("S2,"))
        .expect("post-cancel pen raise");
    let home_idx = commands.iter().position(|c| c == "HM,4000").unwrap();
    assert!(pen_up_idx < home_idx, "pen must be raised before homing");

    // Cancellation event reached subscribers.
    loop {
        match events.recv().await.unwrap() {
            PlotEvent::Cancelled => break,
            PlotEvent::Finished => panic!("cancelled plot must not finish"),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn cancel_suppresses_remaining_motions() {
    let (supervisor, _mock) = supervisor_with("2.7.0");
    let mut events = supervisor.events().receiver();

    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.plot(zigzag_plan()).await });

    let mut seen = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            PlotEvent::Progress { motion_idx, .. } => {
                seen.push(motion_idx);
                if motion_idx == 2 {
                    supervisor.cancel();
                }
            }
            PlotEvent::Cancelled => break,
            PlotEvent::Finished => panic!("cancelled plot must not finish"),
            _ => continue,
        }
    }
    handle.await.unwrap().unwrap();
    assert_eq!(seen, vec![0, 1, 2], "no motion may start after the cancel");
}

#[tokio::test]
async fn second_plot_is_rejected_while_running() {
    let (supervisor, _mock) = supervisor_with("2.7.0");

    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.plot(zigzag_plan()).await });
    wait_for_state(&supervisor, PlotState::Plotting).await;

    let err = supervisor.plot(short_plan()).await.unwrap_err();
    assert!(err.is_plot_in_progress());

    supervisor.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn pause_takes_effect_at_pen_up_boundary_and_resumes() {
    let (supervisor, _mock) = supervisor_with("2.7.0");
    let mut events = supervisor.events().receiver();

    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.plot(zigzag_plan()).await });

    // Pause while the opening travel (pen up) is announced.
    loop {
        if let PlotEvent::Progress { motion_idx: 0, .. } = events.recv().await.unwrap() {
            break;
        }
    }
    supervisor.pause();
    wait_for_state(&supervisor, PlotState::Paused).await;

    supervisor.resume();
    handle.await.unwrap().unwrap();
    assert_eq!(supervisor.state(), PlotState::Idle);

    // Both edges of the pause were broadcast.
    let mut saw_pause = false;
    let mut saw_resume = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PlotEvent::Paused { paused: true } => saw_pause = true,
            PlotEvent::Paused { paused: false } => saw_resume = true,
            _ => {}
        }
    }
    assert!(saw_pause && saw_resume);
}

#[tokio::test]
async fn set_pen_height_rejected_while_plotting() {
    let (supervisor, _mock) = supervisor_with("2.7.0");

    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.plot(zigzag_plan()).await });
    wait_for_state(&supervisor, PlotState::Plotting).await;

    assert!(supervisor.set_pen_height(17750, 400).await.is_err());
    assert!(supervisor.limp().await.is_err());

    supervisor.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn disconnect_cancels_the_plot() {
    let (supervisor, mock) = supervisor_with("2.7.0");
    let mut events = supervisor.events().receiver();

    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.plot(zigzag_plan()).await });
    wait_for_state(&supervisor, PlotState::Plotting).await;

    mock.disconnect();

    let result = handle.await.unwrap();
    assert!(result.unwrap_err().is_transport_error());
    assert_eq!(supervisor.state(), PlotState::Idle);

    loop {
        match events.recv().await.unwrap() {
            PlotEvent::Cancelled => break,
            PlotEvent::Finished => panic!("disconnected plot must not finish"),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn empty_plan_still_brackets_with_motor_commands() {
    let device = Device::v3();
    let profile = ToolingProfile::axidraw_fast(&device);
    let empty = plan(&[], &profile, Vec2::ZERO, StepsPerMm::new(5)).unwrap();

    let (supervisor, mock) = supervisor_with("2.7.0");
    supervisor.plot(empty).await.unwrap();

    let commands = mock.commands();
    assert_eq!(commands[0], "EM,1,1");
    assert_eq!(commands.last().map(String::as_str), Some("SR,60000000,0"));
    // A zero-length travel quantises to zero steps: no motion commands.
    assert!(!commands.iter().any(|c| c.starts_with("LM,") || c.starts_with("XM,")));
}

#[tokio::test]
async fn substep_residual_stays_bounded_across_a_plot() {
    let (supervisor, _mock) = supervisor_with("2.7.0");
    supervisor.plot(zigzag_plan()).await.unwrap();

    let (ex, ey) = supervisor.driver().substep_error();
    assert!((0.0..1.0).contains(&ex));
    assert!((0.0..1.0).contains(&ey));
}
