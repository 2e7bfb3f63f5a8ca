//! # plotkit
//!
//! Pen-plotter control for the AxiDraw family: a constant-acceleration
//! motion planner and an EiBotBoard serial driver with plot supervision.
//!
//! ## Architecture
//!
//! plotkit is organized as a workspace with multiple crates:
//!
//! 1. **plotkit-core** - Geometry, units, device kinematics, profiles, errors, events
//! 2. **plotkit-planner** - Motion primitives and the constant-acceleration planner
//! 3. **plotkit-device** - Serial transport, EBB protocol driver, plot supervisor
//! 4. **plotkit** - Main binary that wires the crates together
//!
//! ## Features
//!
//! - **Planning**: trapezoidal/triangular velocity profiles with corner
//!   velocity propagation and a geometric cornering tolerance
//! - **Driving**: EBB serial protocol with firmware capability gating and
//!   sub-step error accumulation, so long plots do not drift
//! - **Supervision**: pause at pen-up boundaries, cooperative cancel,
//!   pen-safe exit whatever the outcome

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

pub use plotkit_core::{
    AccelerationProfile, Config, Device, DeviceInfo, Error, EventBus, EventFilter, Hardware,
    PlotEvent, Result, StepsPerMm, ToolingProfile, Vec2,
};
pub use plotkit_device::{
    find_ebb_port, list_ebb_ports, ClientMessage, EbbDriver, FirmwareVersion, MicrostepMode,
    PlotState, PlotSupervisor, SerialTransport, ServerMessage,
};
pub use plotkit_planner::{plan, Block, Motion, PenMotion, Plan, XYMotion};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Load a plan from a JSON file
///
/// Accepts either a serialised [`Plan`] or raw polylines in millimetres,
/// which are planned with the given profile from the home position.
pub fn load_plan(
    path: &str,
    device: &Device,
    profile: &ToolingProfile,
) -> anyhow::Result<Plan> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;

    if let Ok(plan) = serde_json::from_str::<Plan>(&contents) {
        return Ok(plan);
    }

    let paths: Vec<Vec<Vec2>> = serde_json::from_str(&contents).map_err(|e| {
        Error::from(plotkit_core::PlannerError::InvalidPlan {
            reason: format!("{} is neither a plan nor a polyline list: {}", path, e),
        })
    })?;
    let plan = plan(&paths, profile, Vec2::ZERO, device.steps_per_mm)?;
    Ok(plan)
}

/// Discover an EBB, execute the plan at `plan_path`, and log progress
pub async fn run(plan_path: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load_or_default(Path::new("plotkit.json"))?;
    let device = Device::for_hardware(config.hardware);
    let profile = config
        .tooling
        .unwrap_or_else(|| ToolingProfile::axidraw_fast(&device));

    let plan_path = plan_path.context("usage: plotkit <plan-or-polylines.json>")?;
    let plan = load_plan(plan_path, &device, &profile)?;
    tracing::info!(
        motions = plan.len(),
        duration_s = format!("{:.1}", plan.duration()),
        "Plan loaded"
    );

    let port = find_ebb_port(config.connection.port.as_deref())?;
    let transport = SerialTransport::open(&port)?;
    let driver = Arc::new(EbbDriver::new(Box::new(transport), device));

    let firmware = driver.firmware_version().await?;
    let events = EventBus::new();
    events.subscribe(EventFilter::All, |event| match event {
        PlotEvent::Progress { motion_idx, total } => {
            tracing::info!("Motion {}/{}", motion_idx + 1, total)
        }
        PlotEvent::Paused { paused } => tracing::info!(paused, "Pause state changed"),
        other => tracing::debug!(?other, "Plot event"),
    });

    let supervisor = PlotSupervisor::new(driver, events);
    supervisor
        .events()
        .publish(PlotEvent::Device(DeviceInfo {
            port: port.clone(),
            firmware: firmware.to_string(),
        }))
        .ok();

    supervisor.plot(plan).await?;
    Ok(())
}
