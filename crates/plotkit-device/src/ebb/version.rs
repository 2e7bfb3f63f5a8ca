//! Firmware version parsing and capability gating
//!
//! The EBB's `V` reply ends with a dotted version, e.g.
//! `EBBv13_and_above EB Firmware Version 2.5.3`. Capabilities that changed
//! across firmware releases are gated here rather than probed per command.

use plotkit_core::ProtocolError;
use std::fmt;

/// A parsed EBB firmware version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
}

impl FirmwareVersion {
    /// Create a version triple
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the last token of a `V` reply
    pub fn parse_reply(reply: &str) -> Result<Self, ProtocolError> {
        let token = reply
            .split_whitespace()
            .last()
            .ok_or_else(|| ProtocolError::BadVersion {
                raw: reply.to_string(),
            })?;

        let mut parts = token.split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| ProtocolError::BadVersion {
                    raw: reply.to_string(),
                })
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        Ok(Self::new(major, minor, patch))
    }

    /// Low-level accelerated moves (`LM`) arrived in 2.5.3
    pub fn supports_lm(&self) -> bool {
        *self >= Self::new(2, 5, 3)
    }

    /// Servo power-off timeout (`SR`) arrived in 2.6.0
    pub fn supports_sr(&self) -> bool {
        *self >= Self::new(2, 6, 0)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
