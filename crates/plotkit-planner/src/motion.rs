//! Motion primitives
//!
//! A [`Plan`] is an ordered list of [`Motion`]s: XY carriage moves built
//! from constant-acceleration [`Block`]s, interleaved with pen servo moves.
//! The types here are immutable once constructed and carry the plan wire
//! format: an XY motion serialises as `{"blocks": [...]}`, a pen motion as
//! `{"initialPos", "finalPos", "duration"}`, and a plan as a plain array.
//!
//! Constructors validate the kinematic invariants, so a plan deserialised
//! from untrusted input is either well-formed or rejected at ingest.

use plotkit_core::{PlannerError, Vec2};
use serde::{Deserialize, Serialize};

/// Numerical noise tolerance for distances and durations
pub const EPS: f64 = 1e-9;

/// Tolerance for velocity continuity checks between blocks
const EPS_V: f64 = 1e-6;

/// A sample of an XY motion at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionInstant {
    /// Sample time from motion start, seconds
    pub t: f64,
    /// Position in steps
    pub p: Vec2,
    /// Distance travelled along the motion, steps
    pub s: f64,
    /// Scalar velocity, steps/s
    pub v: f64,
    /// Scalar acceleration, steps/s^2
    pub a: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    accel: f64,
    duration: f64,
    v_initial: f64,
    p1: Vec2,
    p2: Vec2,
}

/// A single constant-acceleration segment of carriage travel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawBlock")]
pub struct Block {
    /// Signed acceleration, steps/s^2
    pub accel: f64,
    /// Duration, seconds
    pub duration: f64,
    /// Velocity entering the block, steps/s
    pub v_initial: f64,
    /// Start position, steps
    pub p1: Vec2,
    /// End position, steps
    pub p2: Vec2,
}

impl Block {
    /// Construct a block, validating the velocity invariants
    ///
    /// `v_initial` must be non-negative and the block must not decelerate
    /// through zero. Durations within numerical noise of zero are clamped
    /// to exactly zero.
    pub fn new(
        accel: f64,
        duration: f64,
        v_initial: f64,
        p1: Vec2,
        p2: Vec2,
    ) -> Result<Self, PlannerError> {
        if duration < -EPS {
            return Err(PlannerError::NegativeDuration { duration });
        }
        if v_initial < -EPS {
            return Err(PlannerError::NegativeInitialVelocity { v_initial });
        }
        let duration = duration.max(0.0);
        let v_initial = v_initial.max(0.0);
        if v_initial + accel * duration < -EPS_V {
            return Err(PlannerError::VelocityUnderflow {
                v_initial,
                accel,
                duration,
            });
        }
        Ok(Self {
            accel,
            duration,
            v_initial,
            p1,
            p2,
        })
    }

    /// A motionless block pinned at one point
    pub fn stationary(p: Vec2) -> Self {
        Self {
            accel: 0.0,
            duration: 0.0,
            v_initial: 0.0,
            p1: p,
            p2: p,
        }
    }

    /// Straight-line length of the block, steps
    pub fn distance(&self) -> f64 {
        self.p1.distance(self.p2)
    }

    /// Velocity on exit, steps/s
    pub fn v_final(&self) -> f64 {
        (self.v_initial + self.accel * self.duration).max(0.0)
    }

    /// Sample the block `t` seconds after its start
    ///
    /// `t` is clamped to the block's duration; `t_base` and `s_base` offset
    /// the reported time and arc length for use within a larger motion.
    fn instant(&self, t: f64, t_base: f64, s_base: f64) -> MotionInstant {
        let t = t.clamp(0.0, self.duration);
        let v = self.v_initial + self.accel * t;
        let s = self.v_initial * t + 0.5 * self.accel * t * t;
        let p = match (self.p2 - self.p1).normalized() {
            Some(dir) => self.p1 + dir * s,
            None => self.p1,
        };
        MotionInstant {
            t: t_base + t,
            p,
            s: s_base + s,
            v,
            a: self.accel,
        }
    }
}

impl TryFrom<RawBlock> for Block {
    type Error = PlannerError;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        Block::new(raw.accel, raw.duration, raw.v_initial, raw.p1, raw.p2)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawXYMotion {
    blocks: Vec<Block>,
}

/// An XY carriage motion: a chain of blocks continuous in position and
/// velocity, starting and ending at rest
///
/// Prefix sums of the per-block durations and distances are precomputed so
/// [`XYMotion::instant`] samples in `O(log n)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawXYMotion")]
pub struct XYMotion {
    blocks: Vec<Block>,
    #[serde(skip)]
    time_offsets: Vec<f64>,
    #[serde(skip)]
    dist_offsets: Vec<f64>,
    #[serde(skip)]
    total_duration: f64,
    #[serde(skip)]
    total_distance: f64,
}

impl XYMotion {
    /// Build a motion from a non-empty block chain
    ///
    /// Adjacent blocks must join up in both position and velocity.
    pub fn new(blocks: Vec<Block>) -> Result<Self, PlannerError> {
        if blocks.is_empty() {
            return Err(PlannerError::EmptyMotion);
        }
        for (i, pair) in blocks.windows(2).enumerate() {
            if pair[0].p2.distance(pair[1].p1) > EPS_V {
                return Err(PlannerError::Discontinuity {
                    index: i,
                    reason: format!("position jump {} -> {}", pair[0].p2, pair[1].p1),
                });
            }
            if (pair[0].v_final() - pair[1].v_initial).abs() > EPS_V {
                return Err(PlannerError::Discontinuity {
                    index: i,
                    reason: format!(
                        "velocity jump {:.6} -> {:.6}",
                        pair[0].v_final(),
                        pair[1].v_initial
                    ),
                });
            }
        }

        let mut time_offsets = Vec::with_capacity(blocks.len());
        let mut dist_offsets = Vec::with_capacity(blocks.len());
        let mut t = 0.0;
        let mut s = 0.0;
        for block in &blocks {
            time_offsets.push(t);
            dist_offsets.push(s);
            t += block.duration;
            s += block.distance();
        }

        Ok(Self {
            blocks,
            time_offsets,
            dist_offsets,
            total_duration: t,
            total_distance: s,
        })
    }

    /// Start position, steps
    pub fn p1(&self) -> Vec2 {
        self.blocks[0].p1
    }

    /// End position, steps
    pub fn p2(&self) -> Vec2 {
        self.blocks[self.blocks.len() - 1].p2
    }

    /// Total duration, seconds
    pub fn duration(&self) -> f64 {
        self.total_duration
    }

    /// Total path length, steps
    pub fn distance(&self) -> f64 {
        self.total_distance
    }

    /// The underlying block chain
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Sample the motion at time `t` from its start
    ///
    /// `t` is clamped into `[0, duration]`.
    pub fn instant(&self, t: f64) -> MotionInstant {
        let t = t.clamp(0.0, self.total_duration);
        let idx = self
            .time_offsets
            .partition_point(|&start| start <= t)
            .saturating_sub(1);
        let block = &self.blocks[idx];
        block.instant(t - self.time_offsets[idx], self.time_offsets[idx], self.dist_offsets[idx])
    }
}

impl TryFrom<RawXYMotion> for XYMotion {
    type Error = PlannerError;

    fn try_from(raw: RawXYMotion) -> Result<Self, Self::Error> {
        XYMotion::new(raw.blocks)
    }
}

/// A single pen servo movement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenMotion {
    /// Servo count at the start
    pub initial_pos: i32,
    /// Servo count at the end
    pub final_pos: i32,
    /// Movement duration, seconds
    pub duration: f64,
}

impl PenMotion {
    /// Create a pen motion
    pub fn new(initial_pos: i32, final_pos: i32, duration: f64) -> Self {
        Self {
            initial_pos,
            final_pos,
            duration,
        }
    }

    /// True when the motion ends with the pen raised
    ///
    /// Larger servo counts sit higher.
    pub fn is_up(&self) -> bool {
        self.final_pos > self.initial_pos
    }
}

/// A plan entry: either carriage travel or a pen movement
///
/// Serialised untagged; the two shapes share no field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Motion {
    /// XY carriage motion
    XY(XYMotion),
    /// Pen servo motion
    Pen(PenMotion),
}

impl Motion {
    /// Duration of this motion, seconds
    pub fn duration(&self) -> f64 {
        match self {
            Motion::XY(m) => m.duration(),
            Motion::Pen(m) => m.duration,
        }
    }
}

/// An executable plot: ordered motions alternating carriage travel and pen
/// movements, beginning and ending pen-up at the home position
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    motions: Vec<Motion>,
}

impl Plan {
    /// Wrap an ordered motion list
    pub fn new(motions: Vec<Motion>) -> Self {
        Self { motions }
    }

    /// All motions in execution order
    pub fn motions(&self) -> &[Motion] {
        &self.motions
    }

    /// Motion at `idx`, if present
    pub fn motion(&self, idx: usize) -> Option<&Motion> {
        self.motions.get(idx)
    }

    /// Number of motions
    pub fn len(&self) -> usize {
        self.motions.len()
    }

    /// True for a plan with no motions
    pub fn is_empty(&self) -> bool {
        self.motions.is_empty()
    }

    /// Total planned duration, seconds
    pub fn duration(&self) -> f64 {
        self.motions.iter().map(Motion::duration).sum()
    }

    /// Servo position the pen should return to when this plan stops early
    ///
    /// This is the up-position of the plan's own pen motions; `None` for a
    /// plan that never lowers the pen.
    pub fn pen_up_pos(&self) -> Option<i32> {
        self.motions.iter().find_map(|m| match m {
            Motion::Pen(pen) => Some(pen.initial_pos.max(pen.final_pos)),
            Motion::XY(_) => None,
        })
    }

    /// Rewrite pen heights without replanning
    ///
    /// XY motions and all durations are preserved; pen motions are rebuilt
    /// alternating drop, lift, drop, lift as they appear in plan order.
    pub fn with_pen_heights(&self, pen_up_pos: i32, pen_down_pos: i32) -> Plan {
        let mut pen_idx = 0usize;
        let motions = self
            .motions
            .iter()
            .map(|motion| match motion {
                Motion::XY(xy) => Motion::XY(xy.clone()),
                Motion::Pen(pen) => {
                    let rewritten = if pen_idx % 2 == 0 {
                        PenMotion::new(pen_up_pos, pen_down_pos, pen.duration)
                    } else {
                        PenMotion::new(pen_down_pos, pen_up_pos, pen.duration)
                    };
                    pen_idx += 1;
                    Motion::Pen(rewritten)
                }
            })
            .collect();
        Plan::new(motions)
    }
}
