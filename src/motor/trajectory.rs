//! Constant-acceleration trajectory planning for a single axis.
//!
//! Positions, velocities and accelerations are unitless so the same planner
//! serves degrees, radians or motor steps, as long as all values share one
//! base unit.

/// Absolute tolerance for "close to zero" comparisons in the base unit.
const ZERO_TOLERANCE: f64 = 1e-9;

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= ZERO_TOLERANCE
}

/// One constant-acceleration piece of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySegment {
    pub start_time: f64,
    pub start_position: f64,
    pub start_velocity: f64,
    pub acceleration: f64,
}

impl TrajectorySegment {
    /// Position and velocity `time` seconds into this segment.
    pub fn sample(&self, time: f64) -> (f64, f64) {
        accelerated_pos_and_vel(
            self.start_position,
            self.start_velocity,
            self.acceleration,
            time,
        )
    }
}

/// Position and velocity after `time` seconds of uniformly accelerated
/// motion.
pub fn accelerated_pos_and_vel(
    start_position: f64,
    start_velocity: f64,
    acceleration: f64,
    time: f64,
) -> (f64, f64) {
    let velocity = start_velocity + acceleration * time;
    let position = start_position + (velocity + start_velocity) * time / 2.0;
    (position, velocity)
}

/// A planned motion: an ordered list of segments starting at t = 0 and
/// ending at rest on the target.
///
/// The last segment always has zero velocity and zero acceleration, and its
/// start position is the target; along the way the speed never exceeds the
/// commanded maximum and the acceleration is either zero or the configured
/// maximum.
#[derive(Debug, Clone)]
pub struct Trajectory {
    max_acceleration: f64,
    pub segments: Vec<TrajectorySegment>,
}

impl Trajectory {
    /// `max_acceleration` must be strictly positive.
    pub fn new(max_acceleration: f64) -> Self {
        assert!(
            max_acceleration > 0.0,
            "max_acceleration must be strictly positive, got {max_acceleration}"
        );
        Trajectory {
            max_acceleration,
            segments: Vec::new(),
        }
    }

    /// Plan the motion from the current position and velocity to rest at the
    /// target position. `max_velocity` must be strictly positive.
    pub fn plan(&mut self, curr_pos: f64, curr_vel: f64, target_position: f64, max_velocity: f64) {
        assert!(
            max_velocity > 0.0,
            "max_velocity must be strictly positive, got {max_velocity}"
        );
        self.segments.clear();
        if target_position == curr_pos {
            self.plan_from_target_position(curr_pos, curr_vel, target_position, max_velocity);
        } else {
            self.plan_toward_target_position(curr_pos, curr_vel, target_position, max_velocity);
        }
        self.consolidate_segments();
    }

    /// Start time of the final, at-rest segment.
    pub fn total_time(&self) -> f64 {
        self.segments.last().map_or(0.0, |s| s.start_time)
    }

    /// Position and velocity at `time` seconds after the start of the
    /// trajectory.
    pub fn sample(&self, time: f64) -> (f64, f64) {
        let segment = self
            .segments
            .iter()
            .rev()
            .find(|s| time >= s.start_time)
            .or_else(|| self.segments.first())
            .expect("sample called on an empty trajectory");
        segment.sample(time - segment.start_time)
    }

    /// The axis already is on target. Either stay there, or brake and come
    /// back.
    fn plan_from_target_position(
        &mut self,
        curr_pos: f64,
        curr_vel: f64,
        target_position: f64,
        max_velocity: f64,
    ) {
        if is_close(curr_vel, 0.0) {
            self.segments = vec![TrajectorySegment {
                start_time: 0.0,
                start_position: curr_pos,
                start_velocity: curr_vel,
                acceleration: 0.0,
            }];
            return;
        }

        let (max_vel, accel) = if curr_vel > 0.0 {
            (-max_velocity, -self.max_acceleration)
        } else {
            (max_velocity, self.max_acceleration)
        };
        let time_to_stop = (curr_vel / self.max_acceleration).abs();
        let (pos_when_stopped, vel_when_stopped) =
            accelerated_pos_and_vel(curr_pos, curr_vel, accel, time_to_stop);

        let tail = self.segments_toward_target(
            time_to_stop,
            pos_when_stopped,
            vel_when_stopped,
            target_position,
            max_vel,
            accel,
        );
        self.segments = vec![TrajectorySegment {
            start_time: 0.0,
            start_position: curr_pos,
            start_velocity: curr_vel,
            acceleration: accel,
        }];
        self.segments.extend(tail);
    }

    /// The axis is off target. If it moves away from the target, brake
    /// first; then run the accelerate/cruise/decelerate profile.
    fn plan_toward_target_position(
        &mut self,
        curr_pos: f64,
        curr_vel: f64,
        target_position: f64,
        max_velocity: f64,
    ) {
        let sign_pos = (target_position - curr_pos).signum();
        let sign_vel = curr_vel.signum();
        if sign_pos == sign_vel || is_close(curr_vel, 0.0) {
            let (max_vel, accel) = if target_position > curr_pos {
                (max_velocity, self.max_acceleration)
            } else {
                (-max_velocity, -self.max_acceleration)
            };
            self.segments = self.segments_toward_target(
                0.0,
                curr_pos,
                curr_vel,
                target_position,
                max_vel,
                accel,
            );
        } else {
            // Moving away from the target: the braking acceleration already
            // points toward it.
            let (max_vel, accel) = if curr_vel > 0.0 {
                (-max_velocity, -self.max_acceleration)
            } else {
                (max_velocity, self.max_acceleration)
            };
            let time_to_stop = (curr_vel / self.max_acceleration).abs();
            let (pos_when_stopped, vel_when_stopped) =
                accelerated_pos_and_vel(curr_pos, curr_vel, accel, time_to_stop);

            let tail = self.segments_toward_target(
                time_to_stop,
                pos_when_stopped,
                vel_when_stopped,
                target_position,
                max_vel,
                accel,
            );
            self.segments = vec![TrajectorySegment {
                start_time: 0.0,
                start_position: curr_pos,
                start_velocity: curr_vel,
                acceleration: accel,
            }];
            self.segments.extend(tail);
        }
    }

    /// Segments for a motion already headed toward the target. Tries the
    /// accelerate/cruise/decelerate profile first and falls back to the
    /// triangular profile when the cruise velocity cannot be reached.
    fn segments_toward_target(
        &self,
        start_time: f64,
        curr_pos: f64,
        curr_vel: f64,
        target_position: f64,
        max_vel: f64,
        accel: f64,
    ) -> Vec<TrajectorySegment> {
        let segments = self.segments_with_max_velocity(
            start_time,
            curr_pos,
            curr_vel,
            target_position,
            max_vel,
            accel,
        );

        if segments[2].start_time <= segments[1].start_time {
            self.segments_without_max_velocity(
                start_time,
                curr_pos,
                curr_vel,
                target_position,
                accel,
            )
        } else {
            segments
        }
    }

    /// Accelerate to the maximum velocity, cruise, decelerate, rest.
    fn segments_with_max_velocity(
        &self,
        start_time: f64,
        curr_pos: f64,
        curr_vel: f64,
        target_position: f64,
        max_vel: f64,
        accel: f64,
    ) -> Vec<TrajectorySegment> {
        let time_to_max_vel = (max_vel - curr_vel) / accel;
        let (pos_at_max_vel, vel_at_max_vel) =
            accelerated_pos_and_vel(curr_pos, curr_vel, accel, time_to_max_vel);
        let time_needed_to_stop = max_vel / accel;
        let (position_to_start_stopping, _) =
            accelerated_pos_and_vel(target_position, 0.0, -accel, time_needed_to_stop);
        let time_to_start_stopping =
            time_to_max_vel + (position_to_start_stopping - pos_at_max_vel) / max_vel;

        vec![
            TrajectorySegment {
                start_time,
                start_position: curr_pos,
                start_velocity: curr_vel,
                acceleration: accel,
            },
            TrajectorySegment {
                start_time: start_time + time_to_max_vel,
                start_position: pos_at_max_vel,
                start_velocity: vel_at_max_vel,
                acceleration: 0.0,
            },
            TrajectorySegment {
                start_time: start_time + time_to_start_stopping,
                start_position: position_to_start_stopping,
                start_velocity: vel_at_max_vel,
                acceleration: -accel,
            },
            TrajectorySegment {
                start_time: start_time + time_to_start_stopping + time_needed_to_stop,
                start_position: target_position,
                start_velocity: 0.0,
                acceleration: 0.0,
            },
        ]
    }

    /// The cruise velocity is unreachable: run the two ramps so they meet at
    /// the apex, halfway between the natural stopping point and the target.
    fn segments_without_max_velocity(
        &self,
        start_time: f64,
        curr_pos: f64,
        curr_vel: f64,
        target_position: f64,
        accel: f64,
    ) -> Vec<TrajectorySegment> {
        // Time at which the velocity of the current motion reaches zero:
        // v0 + a*t = 0 <=> t = -v0/a
        let t_zero_speed = -curr_vel / accel;

        if t_zero_speed >= 0.0 {
            let (p_zero_speed, _) =
                accelerated_pos_and_vel(curr_pos, curr_vel, accel, t_zero_speed);

            // Halfway between the stopping point and the target is where the
            // velocity has to start decreasing.
            let p_halfway = (p_zero_speed + target_position) / 2.0;
            let t0 = latest_quadratic_root(accel / 2.0, curr_vel, curr_pos - p_halfway);
            let apex_vel = curr_vel + t0 * accel;

            vec![
                TrajectorySegment {
                    start_time,
                    start_position: curr_pos,
                    start_velocity: curr_vel,
                    acceleration: accel,
                },
                TrajectorySegment {
                    start_time: start_time + t0,
                    start_position: p_halfway,
                    start_velocity: apex_vel,
                    acceleration: -accel,
                },
                TrajectorySegment {
                    start_time: start_time + t0 + t0,
                    start_position: target_position,
                    start_velocity: 0.0,
                    acceleration: 0.0,
                },
            ]
        } else {
            let time_needed_to_stop = (curr_vel / accel).abs();
            let (position_to_start_stopping, _) =
                accelerated_pos_and_vel(target_position, 0.0, -accel, time_needed_to_stop);

            let p_halfway = (position_to_start_stopping + curr_pos) / 2.0;
            let t0 = latest_quadratic_root(accel / 2.0, curr_vel, curr_pos - p_halfway);
            let apex_vel = curr_vel + t0 * accel;

            vec![
                TrajectorySegment {
                    start_time,
                    start_position: curr_pos,
                    start_velocity: curr_vel,
                    acceleration: accel,
                },
                TrajectorySegment {
                    start_time: start_time + t0,
                    start_position: p_halfway,
                    start_velocity: apex_vel,
                    acceleration: -accel,
                },
                TrajectorySegment {
                    start_time: start_time + t0 + t0 + time_needed_to_stop,
                    start_position: target_position,
                    start_velocity: 0.0,
                    acceleration: 0.0,
                },
            ]
        }
    }

    /// Drop any segment whose acceleration matches its predecessor's; the
    /// pair describes one continuous motion.
    fn consolidate_segments(&mut self) {
        self.segments
            .dedup_by(|next, prev| is_close(next.acceleration, prev.acceleration));
    }
}

/// The later root of `a*t^2 + b*t + c = 0`; the earlier one lies in the
/// past.
fn latest_quadratic_root(a: f64, b: f64, c: f64) -> f64 {
    let discriminant = (b * b - 4.0 * a * c).max(0.0);
    let sqrt_d = discriminant.sqrt();
    let r1 = (-b + sqrt_d) / (2.0 * a);
    let r2 = (-b - sqrt_d) / (2.0 * a);
    r1.max(r2)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_VELOCITY: f64 = 100_000.0;
    const MAX_ACCELERATION: f64 = 50_000.0;

    fn plan(curr_pos: f64, curr_vel: f64, target: f64) -> Trajectory {
        let mut trajectory = Trajectory::new(MAX_ACCELERATION);
        trajectory.plan(curr_pos, curr_vel, target, MAX_VELOCITY);
        trajectory
    }

    /// Consecutive segments must agree on position and velocity at the
    /// handover time, and the last segment must be at rest on the target.
    fn assert_well_formed(trajectory: &Trajectory, target: f64) {
        let segments = &trajectory.segments;
        assert_eq!(segments[0].start_time, 0.0);
        for pair in segments.windows(2) {
            assert!(pair[1].start_time >= pair[0].start_time);
            let (pos, vel) = pair[0].sample(pair[1].start_time - pair[0].start_time);
            assert_float_absolute_eq!(pos, pair[1].start_position, 1e-9 * target.abs().max(1.0));
            assert_float_absolute_eq!(vel, pair[1].start_velocity, 1e-9 * MAX_VELOCITY);
        }
        let last = segments.last().unwrap();
        assert_eq!(last.start_position, target);
        assert_eq!(last.start_velocity, 0.0);
        assert_eq!(last.acceleration, 0.0);
    }

    #[test]
    fn test_at_rest_on_target() {
        let trajectory = plan(0.0, 0.0, 0.0);
        assert_eq!(
            trajectory.segments,
            vec![TrajectorySegment {
                start_time: 0.0,
                start_position: 0.0,
                start_velocity: 0.0,
                acceleration: 0.0,
            }]
        );
    }

    #[test]
    fn test_cruise_reachable() {
        let trajectory = plan(0.0, 0.0, 1_000_000.0);
        assert_well_formed(&trajectory, 1_000_000.0);
        assert_eq!(trajectory.segments.len(), 4);

        let (pos, vel) = trajectory.sample(1.0);
        assert_float_absolute_eq!(pos, 25_000.0, 1e-6);
        assert_float_absolute_eq!(vel, 50_000.0, 1e-6);
        let (pos, vel) = trajectory.sample(2.0);
        assert_float_absolute_eq!(pos, 100_000.0, 1e-6);
        assert_float_absolute_eq!(vel, 100_000.0, 1e-6);
        let (pos, vel) = trajectory.sample(10.0);
        assert_float_absolute_eq!(pos, 900_000.0, 1e-6);
        assert_float_absolute_eq!(vel, 100_000.0, 1e-6);
        let (pos, vel) = trajectory.sample(11.0);
        assert_float_absolute_eq!(pos, 975_000.0, 1e-6);
        assert_float_absolute_eq!(vel, 50_000.0, 1e-6);
        let (pos, vel) = trajectory.sample(12.0);
        assert_float_absolute_eq!(pos, 1_000_000.0, 1e-6);
        assert_float_absolute_eq!(vel, 0.0, 1e-6);
        assert_float_absolute_eq!(trajectory.total_time(), 12.0, 1e-6);
    }

    #[test]
    fn test_cruise_unreachable_triangular() {
        let trajectory = plan(0.0, 0.0, 100_000.0);
        assert_well_formed(&trajectory, 100_000.0);
        assert_eq!(trajectory.segments.len(), 3);

        let apex_time = trajectory.segments[1].start_time;
        assert_float_absolute_eq!(apex_time, f64::sqrt(2.0), 1e-9);
        assert!(trajectory.segments[1].start_velocity.abs() <= MAX_VELOCITY);
        assert_float_absolute_eq!(trajectory.total_time(), 2.0 * f64::sqrt(2.0), 1e-9);
        let (pos, vel) = trajectory.sample(trajectory.total_time());
        assert_float_absolute_eq!(pos, 100_000.0, 1e-6);
        assert_float_absolute_eq!(vel, 0.0, 1e-6);
    }

    #[test]
    fn test_retarget_mid_cruise() {
        // Three seconds into the long slew the axis cruises at full speed.
        let first = plan(0.0, 0.0, 1_000_000.0);
        let (pos, vel) = first.sample(3.0);
        assert_float_absolute_eq!(pos, 200_000.0, 1e-6);
        assert_float_absolute_eq!(vel, 100_000.0, 1e-6);

        // Retargeting behind the axis brakes through zero, then runs a
        // triangular profile back.
        let second = plan(pos, vel, 100_000.0);
        assert_well_formed(&second, 100_000.0);
        let max_speed = second
            .segments
            .iter()
            .map(|s| s.start_velocity.abs())
            .fold(0.0, f64::max);
        assert!(max_speed <= MAX_VELOCITY + 1e-9);
        assert_float_absolute_eq!(second.total_time(), 6.0, 1e-9);
    }

    #[test]
    fn test_stop_during_cruise_decelerates_in_time() {
        // Braking from cruise speed takes v/a seconds and v^2/2a units.
        let trajectory = plan(0.0, 0.0, 1_000_000.0);
        let (pos, vel) = trajectory.sample(3.0);
        let stop_distance = vel * vel / (2.0 * MAX_ACCELERATION);
        assert_float_absolute_eq!(pos + stop_distance, 300_000.0, 1e-6);

        let mut stop = Trajectory::new(MAX_ACCELERATION);
        stop.plan(pos, vel, pos + stop_distance, MAX_VELOCITY);
        assert_well_formed(&stop, pos + stop_distance);
        assert_float_absolute_eq!(stop.total_time(), vel / MAX_ACCELERATION, 1e-9);
    }

    #[test]
    fn test_on_target_but_moving_returns() {
        let trajectory = plan(500.0, 20_000.0, 500.0);
        assert_well_formed(&trajectory, 500.0);
        // Brakes first: the first segment decelerates.
        assert_eq!(trajectory.segments[0].acceleration, -MAX_ACCELERATION);
        let last = trajectory.segments.last().unwrap();
        assert_eq!(last.start_position, 500.0);
    }

    #[test]
    fn test_negative_direction() {
        let trajectory = plan(0.0, 0.0, -1_000_000.0);
        assert_well_formed(&trajectory, -1_000_000.0);
        let (pos, vel) = trajectory.sample(2.0);
        assert_float_absolute_eq!(pos, -100_000.0, 1e-6);
        assert_float_absolute_eq!(vel, -100_000.0, 1e-6);
    }

    #[test]
    fn test_sample_clamps_before_start() {
        let trajectory = plan(0.0, 0.0, 1_000_000.0);
        let (pos, vel) = trajectory.sample(0.0);
        assert_eq!(pos, 0.0);
        assert_eq!(vel, 0.0);
    }

    #[test]
    #[should_panic]
    fn test_zero_acceleration_is_rejected() {
        let _ = Trajectory::new(0.0);
    }

    #[test]
    #[should_panic]
    fn test_zero_max_velocity_is_rejected() {
        let mut trajectory = Trajectory::new(MAX_ACCELERATION);
        trajectory.plan(0.0, 0.0, 1.0, 0.0);
    }
}
