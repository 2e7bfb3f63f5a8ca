//! Control-channel message types
//!
//! JSON messages exchanged with clients over a message-oriented channel
//! (the channel framing itself lives outside this crate). Every message is
//! an object `{"c": <kind>, "p": <payload>}`, with the payload omitted for
//! kinds that carry none.

use plotkit_core::DeviceInfo;
use plotkit_planner::Plan;
use serde::{Deserialize, Serialize};

/// Messages sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "c", content = "p", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Connected device identity
    Dev(DeviceInfo),
    /// Pause state changed
    Pause {
        /// True when the plot is paused.
        paused: bool,
    },
    /// About to execute a motion
    #[serde(rename_all = "camelCase")]
    Progress {
        /// Index of the motion about to run.
        motion_idx: usize,
    },
    /// The plot stopped before completion
    Cancelled,
    /// The plot ran to completion
    Finished,
    /// The plan currently loaded, sent to late subscribers
    Plan(Plan),
    /// Reply to a ping
    Pong,
}

/// Messages received from clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "c", content = "p", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Liveness check; answered with [`ServerMessage::Pong`]
    Ping,
    /// Cut motor power so the carriage moves freely
    Limp,
    /// Move the pen servo directly; rejected while plotting
    SetPenHeight {
        /// Target servo position.
        height: i32,
        /// Servo rate in counts per 24 ms.
        rate: u32,
    },
}

/// Reply shape for plot status queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotStatus {
    /// True while a plan is executing.
    pub plotting: bool,
}

/// Map a lifecycle event to its outbound message, when one exists
///
/// `PlanLoaded` carries only summary numbers on the bus; the full plan for
/// the `plan` message comes from the supervisor's current plan.
pub fn event_message(
    event: &plotkit_core::PlotEvent,
    current_plan: Option<&Plan>,
) -> Option<ServerMessage> {
    use plotkit_core::PlotEvent;
    match event {
        PlotEvent::Progress { motion_idx, .. } => Some(ServerMessage::Progress {
            motion_idx: *motion_idx,
        }),
        PlotEvent::Paused { paused } => Some(ServerMessage::Pause { paused: *paused }),
        PlotEvent::Cancelled => Some(ServerMessage::Cancelled),
        PlotEvent::Finished => Some(ServerMessage::Finished),
        PlotEvent::Device(info) => Some(ServerMessage::Dev(info.clone())),
        PlotEvent::PlanLoaded { .. } => current_plan.map(|p| ServerMessage::Plan(p.clone())),
    }
}
