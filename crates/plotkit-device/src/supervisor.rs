//! Plot supervision
//!
//! Executes a [`Plan`] motion by motion against the EBB driver while
//! honouring control requests from concurrent clients. The motion loop is
//! the only serial client; pause and cancel arrive as shared flags it
//! observes at well-defined boundaries:
//!
//! - cancel takes effect at the next motion boundary, after the in-flight
//!   command completes;
//! - pause takes effect only at pen-up boundaries, so the pen is never left
//!   resting on the page.
//!
//! Whatever the exit path, the supervisor leaves the pen raised and the
//! motors released before returning to idle.

use crate::ebb::driver::EbbDriver;
use parking_lot::{Mutex, RwLock};
use plotkit_core::{EventBus, PlotEvent, Result, SupervisorError};
use plotkit_planner::{Motion, Plan};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Step rate for the post-cancel homing move
const CANCEL_HOME_RATE: u32 = 4_000;

/// Servo rate used for supervisor-initiated pen moves
const SAFE_PEN_RATE: u32 = 1_000;

/// Lifecycle of one supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlotState {
    /// Ready to accept a plan
    #[default]
    Idle,
    /// Executing motions
    Plotting,
    /// Waiting at a pen-up boundary for resume
    Paused,
    /// Unwinding after a cancel request
    Cancelling,
}

enum Outcome {
    Completed,
    Cancelled,
}

/// Executes plans and arbitrates pause/resume/cancel
///
/// Clone-cheap; all state is shared, so one clone can sit in the motion
/// loop while others serve a control channel.
#[derive(Clone)]
pub struct PlotSupervisor {
    driver: Arc<EbbDriver>,
    events: EventBus,
    state: Arc<RwLock<PlotState>>,
    cancel_requested: Arc<AtomicBool>,
    pause_gate: Arc<Mutex<Option<Arc<Notify>>>>,
    current_plan: Arc<RwLock<Option<Plan>>>,
}

impl PlotSupervisor {
    /// Create a supervisor over a driver, publishing to `events`
    pub fn new(driver: Arc<EbbDriver>, events: EventBus) -> Self {
        Self {
            driver,
            events,
            state: Arc::new(RwLock::new(PlotState::Idle)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            pause_gate: Arc::new(Mutex::new(None)),
            current_plan: Arc::new(RwLock::new(None)),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PlotState {
        *self.state.read()
    }

    /// True while a plan is executing (including paused and cancelling)
    pub fn is_plotting(&self) -> bool {
        self.state() != PlotState::Idle
    }

    /// The plan currently executing, for late subscribers
    pub fn current_plan(&self) -> Option<Plan> {
        self.current_plan.read().clone()
    }

    /// The event bus this supervisor publishes to
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The driver this supervisor executes against
    pub fn driver(&self) -> &Arc<EbbDriver> {
        &self.driver
    }

    /// Execute a plan to completion, cancellation, or failure
    ///
    /// Rejected with [`SupervisorError::PlotInProgress`] unless idle. Any
    /// driver failure is surfaced to the caller after being mapped to a
    /// single `Cancelled` event for clients.
    pub async fn plot(&self, plan: Plan) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != PlotState::Idle {
                return Err(SupervisorError::PlotInProgress.into());
            }
            *state = PlotState::Plotting;
        }
        self.cancel_requested.store(false, Ordering::SeqCst);
        *self.pause_gate.lock() = None;
        *self.current_plan.write() = Some(plan.clone());
        self.events
            .publish(PlotEvent::PlanLoaded {
                motions: plan.len(),
                duration: plan.duration(),
            })
            .ok();
        tracing::info!(
            motions = plan.len(),
            duration_s = format!("{:.1}", plan.duration()),
            "Plot started"
        );

        let outcome = self.run(&plan).await;

        *self.current_plan.write() = None;
        *self.state.write() = PlotState::Idle;

        match outcome {
            Ok(Outcome::Completed) => {
                tracing::info!("Plot finished");
                self.events.publish(PlotEvent::Finished).ok();
                Ok(())
            }
            Ok(Outcome::Cancelled) => {
                tracing::info!("Plot cancelled");
                self.events.publish(PlotEvent::Cancelled).ok();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Plot failed");
                self.events.publish(PlotEvent::Cancelled).ok();
                Err(e)
            }
        }
    }

    async fn run(&self, plan: &Plan) -> Result<Outcome> {
        // Pre-plot: motors on, pen parked where the first pen motion
        // expects to find it.
        self.driver.enable_motors().await?;
        let initial_pen = plan
            .pen_up_pos()
            .unwrap_or_else(|| self.driver.device().pen_pct_to_pos(0.0));
        self.driver
            .set_pen_height(initial_pen, SAFE_PEN_RATE, 0)
            .await?;

        let total = plan.len();
        let mut pen_is_up = true;
        let mut cancelled = false;

        for (idx, motion) in plan.motions().iter().enumerate() {
            if self.cancel_requested.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }
            if pen_is_up {
                self.wait_if_paused().await;
                // A cancel may have arrived while paused.
                if self.cancel_requested.load(Ordering::SeqCst) {
                    cancelled = true;
                    break;
                }
            }

            self.events
                .publish(PlotEvent::Progress {
                    motion_idx: idx,
                    total,
                })
                .ok();

            match motion {
                Motion::XY(xy) => self.driver.xy_motion(xy).await?,
                Motion::Pen(pen) => {
                    self.driver.pen_motion(pen).await?;
                    pen_is_up = pen.is_up();
                }
            }
        }

        if cancelled {
            *self.state.write() = PlotState::Cancelling;
            self.post_cancel(plan, pen_is_up).await?;
            self.post_plot().await?;
            return Ok(Outcome::Cancelled);
        }

        self.post_plot().await?;
        Ok(Outcome::Completed)
    }

    /// Block at a pen-up boundary while a pause is pending
    async fn wait_if_paused(&self) {
        let gate = self.pause_gate.lock().clone();
        if let Some(gate) = gate {
            *self.state.write() = PlotState::Paused;
            tracing::info!("Plot paused at pen-up boundary");
            gate.notified().await;
            *self.state.write() = PlotState::Plotting;
            tracing::info!("Plot resumed");
        }
    }

    /// Raise the pen if needed and home the carriage after a cancel
    async fn post_cancel(&self, plan: &Plan, pen_is_up: bool) -> Result<()> {
        if !pen_is_up {
            let up = plan
                .pen_up_pos()
                .unwrap_or_else(|| self.driver.device().pen_pct_to_pos(0.0));
            self.driver.set_pen_height(up, SAFE_PEN_RATE, 0).await?;
        }
        self.driver.home(CANCEL_HOME_RATE).await
    }

    /// Wait for the board to drain and release the drivetrain
    async fn post_plot(&self) -> Result<()> {
        self.driver.wait_until_idle().await?;
        self.driver.release_motors().await
    }

    /// Request a pause at the next pen-up boundary
    ///
    /// A second pause before resume is a no-op, as is pausing while idle.
    pub fn pause(&self) {
        if !self.is_plotting() {
            return;
        }
        let mut gate = self.pause_gate.lock();
        if gate.is_none() {
            *gate = Some(Arc::new(Notify::new()));
            drop(gate);
            tracing::info!("Pause requested");
            self.events.publish(PlotEvent::Paused { paused: true }).ok();
        }
    }

    /// Release a pending pause
    pub fn resume(&self) {
        let taken = self.pause_gate.lock().take();
        if let Some(gate) = taken {
            gate.notify_one();
            self.events
                .publish(PlotEvent::Paused { paused: false })
                .ok();
        }
    }

    /// Request cancellation at the next motion boundary
    ///
    /// Also releases any pending pause so the motion loop can observe the
    /// flag. Idempotent; further cancels during unwinding do nothing.
    pub fn cancel(&self) {
        if !self.is_plotting() {
            return;
        }
        tracing::info!("Cancel requested");
        self.cancel_requested.store(true, Ordering::SeqCst);
        if let Some(gate) = self.pause_gate.lock().take() {
            gate.notify_one();
        }
    }

    /// Move the pen servo directly; rejected while a plot is running
    pub async fn set_pen_height(&self, height: i32, rate: u32) -> Result<()> {
        if self.is_plotting() {
            return Err(SupervisorError::Busy {
                operation: "setPenHeight".to_string(),
            }
            .into());
        }
        self.driver.set_pen_height(height, rate, 0).await
    }

    /// Cut motor power so the carriage can be moved by hand; rejected while
    /// a plot is running
    pub async fn limp(&self) -> Result<()> {
        if self.is_plotting() {
            return Err(SupervisorError::Busy {
                operation: "limp".to_string(),
            }
            .into());
        }
        self.driver.disable_motors().await
    }
}
