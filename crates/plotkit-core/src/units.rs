//! The millimetre / microstep boundary
//!
//! Path input arrives in millimetres; motion blocks and everything the EBB
//! sees are in device microsteps. The conversion happens exactly once, at
//! the planner interface, through [`StepsPerMm`] so the boundary is visible
//! in signatures instead of being an implicit convention.

use crate::geometry::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device resolution in microsteps per millimetre
///
/// Always a positive integer on real hardware (5 for the stock AxiDraw
/// drivetrain in 16x microstepping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepsPerMm(u32);

impl StepsPerMm {
    /// Create a scale; `steps` must be positive
    pub fn new(steps: u32) -> Self {
        assert!(steps > 0, "steps per mm must be positive");
        Self(steps)
    }

    /// Raw scale factor
    pub fn get(self) -> u32 {
        self.0
    }

    /// Convert a length in millimetres to steps
    pub fn steps(self, mm: f64) -> f64 {
        mm * self.0 as f64
    }

    /// Convert a point in millimetres to steps
    pub fn point_to_steps(self, mm: Vec2) -> Vec2 {
        mm * self.0 as f64
    }

    /// Convert a length in steps back to millimetres
    pub fn mm(self, steps: f64) -> f64 {
        steps / self.0 as f64
    }

    /// Convert a whole polyline from millimetres to steps
    pub fn path_to_steps(self, path: &[Vec2]) -> Vec<Vec2> {
        path.iter().map(|&p| self.point_to_steps(p)).collect()
    }
}

impl fmt::Display for StepsPerMm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} steps/mm", self.0)
    }
}
