//! Event definitions for the plot lifecycle

use serde::{Deserialize, Serialize};

/// Coarse event grouping, used for subscription filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    /// Plot start/stop/pause transitions
    Lifecycle,
    /// Per-motion progress
    Motion,
    /// Device discovery and identification
    Device,
}

/// Information about a connected board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Serial port path
    pub port: String,
    /// Raw firmware version reply
    pub firmware: String,
}

/// Events published while a plot executes
#[derive(Debug, Clone, PartialEq)]
pub enum PlotEvent {
    /// About to execute motion `motion_idx` of `total`
    Progress {
        /// Index of the motion about to run.
        motion_idx: usize,
        /// Total motions in the plan.
        total: usize,
    },
    /// Pause state changed
    Paused {
        /// True when the plot is now paused.
        paused: bool,
    },
    /// The plot was cancelled, either by request or by a failure
    Cancelled,
    /// The plot ran to completion
    Finished,
    /// A board was identified
    Device(DeviceInfo),
    /// A plan was accepted for plotting
    PlanLoaded {
        /// Number of motions in the plan.
        motions: usize,
        /// Total planned duration in seconds.
        duration: f64,
    },
}

impl PlotEvent {
    /// The category this event belongs to
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Progress { .. } => EventCategory::Motion,
            Self::Paused { .. } | Self::Cancelled | Self::Finished | Self::PlanLoaded { .. } => {
                EventCategory::Lifecycle
            }
            Self::Device(_) => EventCategory::Device,
        }
    }
}
