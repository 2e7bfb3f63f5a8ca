//! Device kinematics for the EiBotBoard family
//!
//! A [`Device`] captures the fixed mechanical and servo parameters of one
//! hardware variant. Values are immutable once constructed; pass them by
//! value where needed rather than through globals.

use crate::units::StepsPerMm;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known hardware variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hardware {
    /// AxiDraw V3 with the stock hobby servo
    #[default]
    V3,
    /// AxiDraw with the brushless servo upgrade
    Brushless,
}

impl fmt::Display for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V3 => write!(f, "v3"),
            Self::Brushless => write!(f, "brushless"),
        }
    }
}

/// Immutable device kinematics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Microsteps per millimetre of carriage travel
    pub steps_per_mm: StepsPerMm,
    /// Servo PWM count for the lowest pen position (pen fully down)
    pub pen_servo_min: i32,
    /// Servo PWM count for the highest pen position (pen fully up)
    pub pen_servo_max: i32,
    /// EBB output pin driving the pen servo
    pub servo_pin: u8,
}

impl Device {
    /// Stock AxiDraw V3
    pub fn v3() -> Self {
        Self {
            steps_per_mm: StepsPerMm::new(5),
            pen_servo_min: 7500,
            pen_servo_max: 28000,
            servo_pin: 4,
        }
    }

    /// AxiDraw with the brushless servo upgrade
    pub fn brushless() -> Self {
        Self {
            steps_per_mm: StepsPerMm::new(5),
            pen_servo_min: 5400,
            pen_servo_max: 12600,
            servo_pin: 5,
        }
    }

    /// Look up a device by hardware variant
    pub fn for_hardware(hardware: Hardware) -> Self {
        match hardware {
            Hardware::V3 => Self::v3(),
            Hardware::Brushless => Self::brushless(),
        }
    }

    /// Map a pen height percentage to a servo position
    ///
    /// 0% is the highest position (`pen_servo_max`), 100% the lowest
    /// (`pen_servo_min`); interpolation is linear and rounded to the nearest
    /// integer servo count.
    pub fn pen_pct_to_pos(&self, pct: f64) -> i32 {
        let t = pct / 100.0;
        let pos = self.pen_servo_max as f64 * (1.0 - t) + self.pen_servo_min as f64 * t;
        pos.round() as i32
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::v3()
    }
}
