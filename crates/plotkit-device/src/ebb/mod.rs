//! EiBotBoard protocol support
//!
//! The EBB speaks CR-terminated ASCII at 9600 baud: `driver` owns the
//! request/reply exchange and motion execution, `response` parses reply
//! lines, and `version` gates capabilities that vary across firmware
//! releases.

pub mod driver;
pub mod response;
pub mod version;

pub use driver::{EbbDriver, MicrostepMode, StepAccumulator};
pub use response::{classify, parse_qm, MotionStatus, ReplyLine};
pub use version::FirmwareVersion;
