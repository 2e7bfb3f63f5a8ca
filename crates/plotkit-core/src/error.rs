//! Error handling for plotkit
//!
//! Provides error types for all layers of the system:
//! - Planner errors (motion invariant violations, invalid plans)
//! - Protocol errors (malformed or rejected EBB replies)
//! - Transport errors (serial port failures, disconnects)
//! - Supervisor errors (plot lifecycle violations)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Planner error type
///
/// Violations of motion invariants at construction time indicate a planner
/// bug and are fatal; invalid plans are a caller error surfaced at ingest.
#[derive(Error, Debug, Clone)]
pub enum PlannerError {
    /// A block was constructed with a negative initial velocity
    #[error("Block starts with negative velocity {v_initial}")]
    NegativeInitialVelocity {
        /// The offending initial velocity in steps/s.
        v_initial: f64,
    },

    /// A block decelerates past zero
    #[error("Block decelerates through zero: vInitial={v_initial}, accel={accel}, duration={duration}")]
    VelocityUnderflow {
        /// The block's initial velocity in steps/s.
        v_initial: f64,
        /// The block's acceleration in steps/s^2.
        accel: f64,
        /// The block's duration in seconds.
        duration: f64,
    },

    /// A block has a negative duration
    #[error("Block has negative duration {duration}")]
    NegativeDuration {
        /// The offending duration in seconds.
        duration: f64,
    },

    /// An XY motion was built from an empty block list
    #[error("XY motion requires at least one block")]
    EmptyMotion,

    /// Consecutive blocks do not join up in space or velocity
    #[error("Discontinuity between blocks {index} and {}: {reason}", index + 1)]
    Discontinuity {
        /// Index of the first block of the mismatched pair.
        index: usize,
        /// What failed to line up.
        reason: String,
    },

    /// A plan failed structural validation at ingest
    #[error("Invalid plan: {reason}")]
    InvalidPlan {
        /// Why the plan was rejected.
        reason: String,
    },
}

/// Protocol error type
///
/// Errors in the EBB request/reply exchange. Fatal to the current plot; the
/// supervisor maps them to a single cancellation.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// The board rejected a command with a `!` reply
    #[error("Command {command:?} rejected: {reply}")]
    Rejected {
        /// The command that was rejected.
        command: String,
        /// The full rejection line, including the leading `!`.
        reply: String,
    },

    /// A reply did not have the expected shape
    #[error("Malformed reply to {command:?}: {reply:?}")]
    MalformedReply {
        /// The command the reply belongs to.
        command: String,
        /// The offending reply line.
        reply: String,
    },

    /// The firmware version string could not be parsed
    #[error("Unparseable firmware version: {raw:?}")]
    BadVersion {
        /// The raw version reply.
        raw: String,
    },

    /// Firmware is too old for a required feature and no downgrade exists
    #[error("Firmware {version} lacks required capability: {capability}")]
    CapabilityMismatch {
        /// The detected firmware version.
        version: String,
        /// The missing capability.
        capability: String,
    },
}

/// Transport error type
///
/// Serial read/write failures and disconnects. Triggers the reconnect loop
/// in addition to cancelling any in-flight plot.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// No EBB was found during discovery
    #[error("No EiBotBoard found")]
    DeviceNotFound,

    /// Failed to open the port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The port path.
        port: String,
        /// Why it failed.
        reason: String,
    },

    /// The port closed while a request was outstanding
    #[error("Serial port disconnected")]
    Disconnected,

    /// A read or write failed
    #[error("Serial I/O error: {reason}")]
    Io {
        /// The underlying error message.
        reason: String,
    },
}

/// Supervisor error type
#[derive(Error, Debug, Clone)]
pub enum SupervisorError {
    /// A plot was submitted while one is already running
    #[error("A plot is already in progress")]
    PlotInProgress,

    /// An operation is not valid while a plot is running
    #[error("Not available while plotting: {operation}")]
    Busy {
        /// The rejected operation.
        operation: String,
    },

    /// An operation requires an active plot
    #[error("No plot in progress")]
    NotPlotting,
}

/// Main error type for plotkit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Planner error
    #[error(transparent)]
    Planner(#[from] PlannerError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Supervisor error
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this error should trigger the serial reconnect loop
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a protocol-level failure
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a planner invariant violation
    pub fn is_planner_error(&self) -> bool {
        matches!(self, Error::Planner(_))
    }

    /// Check if this rejects a plot submission without touching state
    pub fn is_plot_in_progress(&self) -> bool {
        matches!(self, Error::Supervisor(SupervisorError::PlotInProgress))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_predicates() {
        let e: Error = TransportError::Disconnected.into();
        assert!(e.is_transport_error());
        assert!(!e.is_protocol_error());

        let e: Error = SupervisorError::PlotInProgress.into();
        assert!(e.is_plot_in_progress());
    }

    #[test]
    fn test_display_carries_context() {
        let e = ProtocolError::Rejected {
            command: "QM".to_string(),
            reply: "!8 Err: CommandNotFound".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("QM"));
        assert!(msg.contains("CommandNotFound"));
    }
}
