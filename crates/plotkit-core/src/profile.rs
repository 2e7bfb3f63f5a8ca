//! Tooling profiles: acceleration limits and servo timings
//!
//! A profile is keyed to pen state. Travelling (pen up) tolerates higher
//! acceleration and speed than drawing (pen down), and only drawing uses a
//! non-zero cornering factor. All values are in step units so the planner
//! never mixes them with millimetre inputs.

use crate::device::Device;
use serde::{Deserialize, Serialize};

/// Per-axis limits for one constant-acceleration regime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccelerationProfile {
    /// Acceleration magnitude in steps/s^2
    pub acceleration: f64,
    /// Velocity ceiling in steps/s
    pub max_velocity: f64,
    /// Radius of the virtual inscribed corner arc, in steps; 0 forces a
    /// full stop at every junction
    pub cornering_factor: f64,
}

/// Complete tooling parameters for a plot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolingProfile {
    /// Limits while drawing
    pub pen_down_profile: AccelerationProfile,
    /// Limits while travelling
    pub pen_up_profile: AccelerationProfile,
    /// Servo count for the drawing height
    pub pen_down_pos: i32,
    /// Servo count for the travel height
    pub pen_up_pos: i32,
    /// Seconds to raise the pen
    pub pen_lift_duration: f64,
    /// Seconds to lower the pen
    pub pen_drop_duration: f64,
}

impl ToolingProfile {
    /// The stock fast profile for an AxiDraw-class device
    ///
    /// Pen-down limits are 200 mm/s^2 and 50 mm/s with a 0.127 mm cornering
    /// radius; pen-up limits are 400 mm/s^2 and 200 mm/s with cornering
    /// disabled. Heights sit at 50% (up) and 60% (down) of the servo range.
    pub fn axidraw_fast(device: &Device) -> Self {
        let steps = device.steps_per_mm.get() as f64;
        Self {
            pen_down_profile: AccelerationProfile {
                acceleration: 200.0 * steps,
                max_velocity: 50.0 * steps,
                cornering_factor: 0.127 * steps,
            },
            pen_up_profile: AccelerationProfile {
                acceleration: 400.0 * steps,
                max_velocity: 200.0 * steps,
                cornering_factor: 0.0,
            },
            pen_down_pos: device.pen_pct_to_pos(60.0),
            pen_up_pos: device.pen_pct_to_pos(50.0),
            pen_lift_duration: 0.12,
            pen_drop_duration: 0.12,
        }
    }

    /// Replace the pen heights, keeping motion limits and timings
    pub fn with_pen_heights(mut self, up_pos: i32, down_pos: i32) -> Self {
        self.pen_up_pos = up_pos;
        self.pen_down_pos = down_pos;
        self
    }
}

impl Default for ToolingProfile {
    fn default() -> Self {
        Self::axidraw_fast(&Device::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axidraw_fast_step_units() {
        let p = ToolingProfile::axidraw_fast(&Device::v3());
        assert_eq!(p.pen_down_profile.acceleration, 1000.0);
        assert_eq!(p.pen_down_profile.max_velocity, 250.0);
        assert!((p.pen_down_profile.cornering_factor - 0.635).abs() < 1e-12);
        assert_eq!(p.pen_up_profile.cornering_factor, 0.0);
    }

    #[test]
    fn test_pen_heights_ordering() {
        // Larger servo count is higher; the travel height must sit above
        // the drawing height.
        let p = ToolingProfile::default();
        assert!(p.pen_up_pos > p.pen_down_pos);
    }

    #[test]
    fn test_with_pen_heights() {
        let p = ToolingProfile::default().with_pen_heights(20000, 9000);
        assert_eq!(p.pen_up_pos, 20000);
        assert_eq!(p.pen_down_pos, 9000);
        assert_eq!(p.pen_lift_duration, 0.12);
    }
}
