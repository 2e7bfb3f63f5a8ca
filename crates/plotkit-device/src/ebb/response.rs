//! EBB reply classification and parsing
//!
//! Replies are CR/LF-terminated ASCII lines. Mutation commands answer `OK`,
//! queries answer one payload line, and any line opening with `!` is a
//! rejection of the command in flight.

use plotkit_core::ProtocolError;

/// How one reply line relates to the request in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLine {
    /// Terminates a mutation command successfully
    Ok,
    /// The firmware rejected the command
    Rejection(String),
    /// Payload for a query, or an intermediate line of a multi-line reply
    Payload(String),
}

/// Classify one trimmed reply line
pub fn classify(line: &str) -> ReplyLine {
    if line == "OK" {
        ReplyLine::Ok
    } else if line.starts_with('!') {
        ReplyLine::Rejection(line.to_string())
    } else {
        ReplyLine::Payload(line.to_string())
    }
}

/// Parsed `QM` motion status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionStatus {
    /// A command is executing
    pub command_active: bool,
    /// Motor 1 is moving
    pub motor1_active: bool,
    /// Motor 2 is moving
    pub motor2_active: bool,
    /// Moves remain queued in the FIFO
    pub fifo_pending: bool,
}

impl MotionStatus {
    /// True when the board has drained all motion
    pub fn is_idle(&self) -> bool {
        !self.command_active && !self.fifo_pending
    }
}

/// Parse a `QM` reply: `QM,<global>,<cmd>,<motor1>,<motor2>,<fifo>`
///
/// The FIFO field is absent on firmware older than 2.4.4; treat it as
/// drained in that case.
pub fn parse_qm(line: &str) -> Result<MotionStatus, ProtocolError> {
    let malformed = || ProtocolError::MalformedReply {
        command: "QM".to_string(),
        reply: line.to_string(),
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 5 || fields[0] != "QM" {
        return Err(malformed());
    }

    let flag = |s: &str| match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(malformed()),
    };

    Ok(MotionStatus {
        command_active: flag(fields[2])?,
        motor1_active: flag(fields[3])?,
        motor2_active: flag(fields[4])?,
        fifo_pending: fields.get(5).map(|s| flag(s)).transpose()?.unwrap_or(false),
    })
}
