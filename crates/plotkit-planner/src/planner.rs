//! Constant-acceleration path planning
//!
//! Turns polylines into [`XYMotion`]s whose velocity profile is triangular
//! or trapezoidal per segment, with corner velocities chosen by the
//! inscribed-arc cornering heuristic, and assembles whole-plot [`Plan`]s
//! with pen travel interleaved.
//!
//! Path input is in millimetres; coordinates are scaled to device steps as
//! segments are built, so every block and every profile value downstream of
//! this module is in step units.

use crate::motion::{Block, Motion, PenMotion, Plan, XYMotion, EPS};
use plotkit_core::{AccelerationProfile, PlannerError, StepsPerMm, ToolingProfile, Vec2};

/// Working state for one polyline segment during the velocity sweep
#[derive(Debug, Clone)]
struct Segment {
    p1: Vec2,
    p2: Vec2,
    max_entry_velocity: f64,
    entry_velocity: f64,
    blocks: Vec<Block>,
}

impl Segment {
    fn new(p1: Vec2, p2: Vec2) -> Self {
        Self {
            p1,
            p2,
            max_entry_velocity: 0.0,
            entry_velocity: 0.0,
            blocks: Vec::new(),
        }
    }

    fn length(&self) -> f64 {
        self.p1.distance(self.p2)
    }

    fn direction(&self) -> Option<Vec2> {
        (self.p2 - self.p1).normalized()
    }
}

/// Drop consecutive points closer than the noise tolerance
fn dedup_points(points: &[Vec2]) -> Vec<Vec2> {
    let mut deduped: Vec<Vec2> = Vec::with_capacity(points.len());
    for &p in points {
        match deduped.last() {
            Some(&last) if last.distance(p) < EPS => {}
            _ => deduped.push(p),
        }
    }
    deduped
}

/// Maximum velocity through the junction between two segments
///
/// Uses the inscribed-arc heuristic: the corner is traversed along a
/// virtual arc of radius `cornering_factor` whose centripetal acceleration
/// equals the profile acceleration. Collinear continuations are unlimited,
/// direct reversals and zero-length neighbours force a stop.
fn corner_velocity(
    seg1: &Segment,
    seg2: &Segment,
    v_max: f64,
    accel: f64,
    cornering_factor: f64,
) -> f64 {
    let (Some(dir1), Some(dir2)) = (seg1.direction(), seg2.direction()) else {
        // Undefined direction: the terminal zero-length segment lands here.
        return 0.0;
    };
    let cosine = -dir1.dot(dir2);
    if cornering_factor <= 0.0 || cosine > 1.0 - 1e-6 {
        return 0.0;
    }
    let sine = ((1.0 - cosine) / 2.0).sqrt();
    if (sine - 1.0).abs() < EPS {
        return v_max;
    }
    let v = (accel * cornering_factor * sine / (1.0 - sine)).sqrt();
    v.min(v_max)
}

/// Accelerating/decelerating split of a segment
struct TrianglePeak {
    /// Distance spent accelerating
    s1: f64,
    /// Distance spent decelerating
    s2: f64,
    /// Velocity at the apex
    v_peak: f64,
}

fn triangle(distance: f64, v_in: f64, v_out: f64, accel: f64) -> TrianglePeak {
    let s1 = (2.0 * accel * distance + v_out * v_out - v_in * v_in) / (4.0 * accel);
    let s2 = distance - s1;
    let v_peak = (v_in * v_in + 2.0 * accel * s1).max(0.0).sqrt();
    TrianglePeak { s1, s2, v_peak }
}

/// Plan one polyline (in steps) under one acceleration profile
///
/// The result starts and ends at rest, honours the profile's acceleration
/// and velocity ceilings, and slows through corners per the profile's
/// cornering factor. A single-point input produces a stationary
/// zero-duration motion at that point.
pub fn constant_acceleration_plan(
    points: &[Vec2],
    profile: &AccelerationProfile,
) -> Result<XYMotion, PlannerError> {
    debug_assert!(profile.acceleration > 0.0, "profile acceleration must be positive");

    let points = dedup_points(points);
    if points.is_empty() {
        return Err(PlannerError::EmptyMotion);
    }
    if points.len() == 1 {
        return XYMotion::new(vec![Block::stationary(points[0])]);
    }

    let accel = profile.acceleration;
    let v_max = profile.max_velocity;

    let mut segments: Vec<Segment> = points.windows(2).map(|w| Segment::new(w[0], w[1])).collect();
    // Zero-length terminal segment; its undefined direction forces the
    // sweep to bring the path to rest at the last point.
    let last = points[points.len() - 1];
    segments.push(Segment::new(last, last));

    for i in 1..segments.len() {
        let v = corner_velocity(
            &segments[i - 1],
            &segments[i],
            v_max,
            accel,
            profile.cornering_factor,
        );
        segments[i].max_entry_velocity = v;
    }

    // Combined forward/backward sweep. Walking forward, each segment gets a
    // triangular split against its exit constraint; a negative accelerating
    // distance means the entry was too fast, so the entry limit tightens
    // and the walk backs up one segment to replan against it.
    let mut i = 0usize;
    while i + 1 < segments.len() {
        let distance = segments[i].length();
        let v_in = segments[i].entry_velocity;
        let v_out = segments[i + 1].max_entry_velocity;
        let p1 = segments[i].p1;
        let p2 = segments[i].p2;

        let peak = triangle(distance, v_in, v_out, accel);

        if peak.s1 < -EPS {
            segments[i].max_entry_velocity = (v_out * v_out + 2.0 * accel * distance).sqrt();
            debug_assert!(i > 0, "first segment enters at rest");
            i = i.saturating_sub(1);
            continue;
        }

        if peak.s2 <= 0.0 {
            // The whole segment accelerates; the exit constraint is not
            // reachable from here.
            let v_f = (v_in * v_in + 2.0 * accel * distance).sqrt();
            let t = (v_f - v_in) / accel;
            segments[i].blocks = vec![Block::new(accel, t, v_in, p1, p2)?];
            segments[i + 1].entry_velocity = v_f;
        } else if peak.v_peak > v_max {
            // Trapezoid: accelerate to the ceiling, cruise, decelerate.
            let t1 = (v_max - v_in) / accel;
            let s1 = (v_max + v_in) / 2.0 * t1;
            let t3 = (v_max - v_out) / accel;
            let s3 = (v_max + v_out) / 2.0 * t3;
            let s2 = distance - s1 - s3;
            let t2 = s2 / v_max;
            let p_cruise = p1.lerp(p2, s1 / distance);
            let p_brake = p1.lerp(p2, (s1 + s2) / distance);
            segments[i].blocks = vec![
                Block::new(accel, t1, v_in, p1, p_cruise)?,
                Block::new(0.0, t2, v_max, p_cruise, p_brake)?,
                Block::new(-accel, t3, v_max, p_brake, p2)?,
            ];
            segments[i + 1].entry_velocity = v_out;
        } else {
            // Triangle: accelerate to the apex, decelerate to the exit.
            let s1 = peak.s1.clamp(0.0, distance);
            let t1 = (peak.v_peak - v_in).max(0.0) / accel;
            let t2 = (peak.v_peak - v_out).max(0.0) / accel;
            let p_apex = p1.lerp(p2, s1 / distance);
            segments[i].blocks = vec![
                Block::new(accel, t1, v_in, p1, p_apex)?,
                Block::new(-accel, t2, peak.v_peak, p_apex, p2)?,
            ];
            segments[i + 1].entry_velocity = v_out;
        }
        i += 1;
    }

    let blocks: Vec<Block> = segments
        .iter()
        .flat_map(|s| s.blocks.iter().copied())
        .filter(|b| b.duration > EPS)
        .collect();

    if blocks.is_empty() {
        return XYMotion::new(vec![Block::stationary(points[0])]);
    }
    XYMotion::new(blocks)
}

/// Plan a whole plot
///
/// `paths` are polylines in millimetres; `pen_home` is in steps. Each
/// polyline becomes a pen-up travel, a pen drop, a pen-down draw, and a pen
/// lift; the plan closes with a travel back to `pen_home`. Empty polylines
/// are skipped.
pub fn plan(
    paths: &[Vec<Vec2>],
    profile: &ToolingProfile,
    pen_home: Vec2,
    steps_per_mm: StepsPerMm,
) -> Result<Plan, PlannerError> {
    let pen_drop = PenMotion::new(
        profile.pen_up_pos,
        profile.pen_down_pos,
        profile.pen_drop_duration,
    );
    let pen_lift = PenMotion::new(
        profile.pen_down_pos,
        profile.pen_up_pos,
        profile.pen_lift_duration,
    );

    let mut motions: Vec<Motion> = Vec::with_capacity(paths.len() * 4 + 1);
    let mut cursor = pen_home;

    for path in paths {
        if path.is_empty() {
            tracing::debug!("Skipping empty polyline");
            continue;
        }
        let steps = steps_per_mm.path_to_steps(path);
        let draw = constant_acceleration_plan(&steps, &profile.pen_down_profile)?;
        let travel = constant_acceleration_plan(&[cursor, draw.p1()], &profile.pen_up_profile)?;
        cursor = draw.p2();
        motions.push(Motion::XY(travel));
        motions.push(Motion::Pen(pen_drop));
        motions.push(Motion::XY(draw));
        motions.push(Motion::Pen(pen_lift));
    }

    let home = constant_acceleration_plan(&[cursor, pen_home], &profile.pen_up_profile)?;
    motions.push(Motion::XY(home));

    tracing::debug!(
        motions = motions.len(),
        duration_s = format!("{:.2}", motions.iter().map(Motion::duration).sum::<f64>()),
        "Plan assembled"
    );
    Ok(Plan::new(motions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotkit_core::Device;

    fn v(x: f64, y: f64) -> Vec2 {
        Vec2::new(x, y)
    }

    fn down_profile() -> AccelerationProfile {
        ToolingProfile::axidraw_fast(&Device::v3()).pen_down_profile
    }

    #[test]
    fn test_dedup_drops_repeats() {
        let points = [v(0.0, 0.0), v(0.0, 0.0), v(1.0, 0.0), v(1.0, 0.0)];
        assert_eq!(dedup_points(&points), vec![v(0.0, 0.0), v(1.0, 0.0)]);
    }

    #[test]
    fn test_corner_velocity_collinear_is_unlimited() {
        let a = Segment::new(v(0.0, 0.0), v(10.0, 0.0));
        let b = Segment::new(v(10.0, 0.0), v(20.0, 0.0));
        assert_eq!(corner_velocity(&a, &b, 250.0, 1000.0, 0.635), 250.0);
    }

    #[test]
    fn test_corner_velocity_reversal_stops() {
        let a = Segment::new(v(0.0, 0.0), v(10.0, 0.0));
        let b = Segment::new(v(10.0, 0.0), v(0.0, 0.0));
        assert_eq!(corner_velocity(&a, &b, 250.0, 1000.0, 0.635), 0.0);
    }

    #[test]
    fn test_corner_velocity_zero_factor_stops() {
        let a = Segment::new(v(0.0, 0.0), v(10.0, 0.0));
        let b = Segment::new(v(10.0, 0.0), v(10.0, 10.0));
        assert_eq!(corner_velocity(&a, &b, 250.0, 1000.0, 0.0), 0.0);
    }

    #[test]
    fn test_corner_velocity_right_angle_formula() {
        let a = Segment::new(v(0.0, 0.0), v(10.0, 0.0));
        let b = Segment::new(v(10.0, 0.0), v(10.0, 10.0));
        let k = 0.635;
        let accel = 1000.0;
        let s = (0.5f64).sqrt();
        let expected = (accel * k * s / (1.0 - s)).sqrt();
        let got = corner_velocity(&a, &b, 250.0, accel, k);
        assert!((got - expected).abs() < 1e-9, "got {got}, expected {expected}");
    }

    #[test]
    fn test_corner_velocity_zero_length_neighbour_stops() {
        let a = Segment::new(v(0.0, 0.0), v(10.0, 0.0));
        let b = Segment::new(v(10.0, 0.0), v(10.0, 0.0));
        assert_eq!(corner_velocity(&a, &b, 250.0, 1000.0, 0.635), 0.0);
    }

    #[test]
    fn test_single_point_is_stationary() {
        let m = constant_acceleration_plan(&[v(50.0, 50.0)], &down_profile()).unwrap();
        assert_eq!(m.duration(), 0.0);
        assert_eq!(m.p1(), v(50.0, 50.0));
        assert_eq!(m.p2(), v(50.0, 50.0));
    }

    #[test]
    fn test_line_starts_and_ends_at_rest() {
        let m = constant_acceleration_plan(&[v(0.0, 0.0), v(500.0, 0.0)], &down_profile()).unwrap();
        assert!(m.duration() > 0.0);
        assert!(m.instant(0.0).v.abs() < 1e-9);
        assert!(m.instant(m.duration()).v.abs() < 1e-6);
        assert_eq!(m.p2(), v(500.0, 0.0));
    }

    #[test]
    fn test_long_line_hits_cruise() {
        // 5000 steps is ample room for the 250 steps/s ceiling.
        let m = constant_acceleration_plan(&[v(0.0, 0.0), v(5000.0, 0.0)], &down_profile()).unwrap();
        let cruise = m
            .blocks()
            .iter()
            .find(|b| b.accel == 0.0)
            .expect("long line should have a cruise block");
        assert!((cruise.v_initial - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_line_is_triangular() {
        // 10 steps cannot reach the 250 steps/s ceiling at 1000 steps/s^2.
        let m = constant_acceleration_plan(&[v(0.0, 0.0), v(10.0, 0.0)], &down_profile()).unwrap();
        assert_eq!(m.blocks().len(), 2);
        let peak = m.blocks()[0].v_final();
        assert!(peak < 250.0);
        assert!((peak - (2.0f64 * 1000.0 * 5.0).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_velocity_never_exceeds_ceiling() {
        let profile = down_profile();
        let paths = [
            vec![v(0.0, 0.0), v(3000.0, 0.0), v(3000.0, 40.0), v(0.0, 40.0)],
            vec![v(0.0, 0.0), v(7.0, 3.0), v(14.0, 0.0)],
        ];
        for path in &paths {
            let m = constant_acceleration_plan(path, &profile).unwrap();
            let steps = 500;
            for i in 0..=steps {
                let t = m.duration() * i as f64 / steps as f64;
                let sample = m.instant(t);
                assert!(
                    sample.v <= profile.max_velocity + 1e-6,
                    "velocity {} exceeds ceiling at t={}",
                    sample.v,
                    t
                );
                assert!(sample.a.abs() <= profile.acceleration + 1e-9);
            }
        }
    }

    #[test]
    fn test_collinear_point_does_not_change_duration() {
        let profile = down_profile();
        let direct =
            constant_acceleration_plan(&[v(50.0, 50.0), v(150.0, 50.0)], &profile).unwrap();
        let via_mid = constant_acceleration_plan(
            &[v(50.0, 50.0), v(125.0, 50.0), v(150.0, 50.0)],
            &profile,
        )
        .unwrap();
        assert!(
            (direct.duration() - via_mid.duration()).abs() < 1e-9,
            "direct {} vs via mid {}",
            direct.duration(),
            via_mid.duration()
        );
    }

    #[test]
    fn test_sharp_corner_slows_down() {
        let profile = down_profile();
        // Long approach so both legs could otherwise cruise at the ceiling.
        let corner = v(2000.0, 0.0);
        let m = constant_acceleration_plan(&[v(0.0, 0.0), corner, v(2000.0, 2000.0)], &profile)
            .unwrap();

        let entering = m
            .blocks()
            .iter()
            .find(|b| b.p2.distance(corner) < 1e-6)
            .expect("some block must end at the corner");
        let s = (0.5f64).sqrt();
        let expected =
            (profile.acceleration * profile.cornering_factor * s / (1.0 - s)).sqrt();
        assert!(
            (entering.v_final() - expected).abs() < 1e-6,
            "corner velocity {} should equal {}",
            entering.v_final(),
            expected
        );
    }

    #[test]
    fn test_backtrack_short_final_segment() {
        // A long fast segment into a very short one: the sweep must back up
        // and enter the short segment slowly enough to stop at its end.
        let profile = down_profile();
        let m = constant_acceleration_plan(
            &[v(0.0, 0.0), v(4000.0, 0.0), v(4000.0, 0.5)],
            &profile,
        )
        .unwrap();
        assert!(m.instant(m.duration()).v.abs() < 1e-6);
        // Velocity continuity is enforced by the XYMotion constructor; reaching
        // here means the backtrack produced a consistent chain.
    }

    #[test]
    fn test_plan_empty_input_is_single_stationary_travel() {
        let profile = ToolingProfile::axidraw_fast(&Device::v3());
        let p = plan(&[], &profile, Vec2::ZERO, StepsPerMm::new(5)).unwrap();
        assert_eq!(p.len(), 1);
        assert!(matches!(p.motions()[0], Motion::XY(_)));
        assert_eq!(p.duration(), 0.0);
    }

    #[test]
    fn test_plan_single_point_sandwich() {
        let device = Device::v3();
        let profile = ToolingProfile::axidraw_fast(&device);
        let p = plan(
            &[vec![v(10.0, 10.0)]],
            &profile,
            Vec2::ZERO,
            device.steps_per_mm,
        )
        .unwrap();

        // travel, drop, draw, lift, travel home
        assert_eq!(p.len(), 5);
        let Motion::XY(travel) = &p.motions()[0] else {
            panic!("expected travel");
        };
        assert_eq!(travel.p1(), Vec2::ZERO);
        assert_eq!(travel.p2(), v(50.0, 50.0));
        let Motion::Pen(drop) = &p.motions()[1] else {
            panic!("expected pen drop");
        };
        assert!(!drop.is_up());
        let Motion::XY(draw) = &p.motions()[2] else {
            panic!("expected draw");
        };
        assert_eq!(draw.duration(), 0.0);
        assert_eq!(draw.p1(), v(50.0, 50.0));
        let Motion::Pen(lift) = &p.motions()[3] else {
            panic!("expected pen lift");
        };
        assert!(lift.is_up());
        let Motion::XY(home) = &p.motions()[4] else {
            panic!("expected travel home");
        };
        assert_eq!(home.p2(), Vec2::ZERO);
    }

    #[test]
    fn test_plan_returns_home_and_alternates_pen() {
        let device = Device::v3();
        let profile = ToolingProfile::axidraw_fast(&device);
        let paths = vec![
            vec![v(10.0, 10.0), v(20.0, 10.0)],
            vec![v(30.0, 30.0), v(40.0, 40.0), v(30.0, 50.0)],
        ];
        let p = plan(&paths, &profile, Vec2::ZERO, device.steps_per_mm).unwrap();
        assert_eq!(p.len(), 9);

        // Walk the motions tracking position continuity and pen alternation.
        let mut pos = Vec2::ZERO;
        let mut expect_down = true;
        for motion in p.motions() {
            match motion {
                Motion::XY(xy) => {
                    assert!(pos.distance(xy.p1()) < 1e-9, "XY motions must chain");
                    assert!(xy.instant(0.0).v.abs() < 1e-9);
                    assert!(xy.instant(xy.duration()).v.abs() < 1e-6);
                    pos = xy.p2();
                }
                Motion::Pen(pen) => {
                    assert_eq!(pen.is_up(), !expect_down);
                    expect_down = !expect_down;
                }
            }
        }
        assert!(pos.distance(Vec2::ZERO) < 1e-9, "plan must end at home");
    }

    #[test]
    fn test_plan_draw_coordinates_are_scaled_to_steps() {
        let device = Device::v3();
        let profile = ToolingProfile::axidraw_fast(&device);
        let p = plan(
            &[vec![v(10.0, 10.0), v(20.0, 10.0)]],
            &profile,
            Vec2::ZERO,
            device.steps_per_mm,
        )
        .unwrap();
        let Motion::XY(draw) = &p.motions()[2] else {
            panic!("expected draw");
        };
        assert_eq!(draw.p1(), v(50.0, 50.0));
        assert_eq!(draw.p2(), v(100.0, 50.0));
    }
}
