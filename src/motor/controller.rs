//! Per-axis motor abstraction: step/angle conversion, motion primitives and
//! the state lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::astro_math::{wrap_at_180, Degrees};
use crate::enums::{Axis, MotorState, SlewRate};
use crate::errors::{MountError, Result};
use crate::motor::trajectory::{accelerated_pos_and_vel, Trajectory};
use crate::motor::StepperDriver;

/// Deadline for the underlying hardware to report attachment.
pub const ATTACH_TIMEOUT: Duration = Duration::from_secs(2);

/// The mutable per-axis record. Hardware callbacks write position and
/// velocity here; readers take the whole record as one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MotorRecord {
    /// Raw motor position [steps].
    pub position: f64,
    /// Raw motor velocity [steps/sec].
    pub velocity: f64,
    /// Offset applied before converting steps to an angle [steps].
    pub position_offset: f64,
    pub state: MotorState,
    pub attached: bool,
}

impl Default for MotorRecord {
    fn default() -> Self {
        MotorRecord {
            position: 0.0,
            velocity: 0.0,
            position_offset: 0.0,
            state: MotorState::Stopped,
            attached: false,
        }
    }
}

pub type SharedMotorRecord = Arc<Mutex<MotorRecord>>;

/// One mount axis.
///
/// Angles and steps relate through
/// `angle = (position + position_offset) * conversion_factor`, with the
/// angle wrapped at +/-180 deg for altitude and into [0, 360) for azimuth.
/// Targets are always reached the short way round.
pub struct MotorController {
    axis: Axis,
    /// Angle per motor step [deg/step].
    conversion_factor: Degrees,
    /// Maximum velocity [steps/sec].
    max_velocity: f64,
    /// Maximum acceleration [steps/sec^2].
    max_acceleration: f64,
    record: SharedMotorRecord,
    driver: Box<dyn StepperDriver>,
}

impl MotorController {
    pub fn new(
        axis: Axis,
        conversion_factor: Degrees,
        driver: Box<dyn StepperDriver>,
        record: SharedMotorRecord,
    ) -> Self {
        debug!(
            ?axis,
            conversion_factor,
            arcsec_per_step = conversion_factor * 3600.0,
            "Conversion factor set."
        );
        MotorController {
            axis,
            conversion_factor,
            max_velocity: driver.max_velocity(),
            max_acceleration: driver.max_acceleration(),
            record,
            driver,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn state(&self) -> MotorState {
        self.record.lock().unwrap().state
    }

    pub fn is_attached(&self) -> bool {
        self.record.lock().unwrap().attached
    }

    /// The axis angle [deg], wrapped for the axis kind.
    pub fn position(&self) -> Degrees {
        let record = self.record.lock().unwrap();
        self.angle_of(&record, record.position)
    }

    /// The axis angular velocity [deg/sec].
    pub fn velocity(&self) -> Degrees {
        self.record.lock().unwrap().velocity * self.conversion_factor
    }

    /// Overwrite the reported angle by adjusting the position offset. Used
    /// when a plate solve pins the axis to an absolute sky reference.
    pub fn set_position(&self, angle: Degrees) {
        let mut record = self.record.lock().unwrap();
        record.position_offset = angle / self.conversion_factor - record.position;
    }

    /// Promote a motor that has come to rest to TRACKING. A STOPPED motor
    /// stays stopped.
    pub fn update_tracking_state(&self) {
        let mut record = self.record.lock().unwrap();
        if record.state != MotorState::Stopped && record.velocity == 0.0 {
            record.state = MotorState::Tracking;
        }
    }

    fn angle_of(&self, record: &MotorRecord, steps: f64) -> Degrees {
        self.axis
            .wrap((steps + record.position_offset) * self.conversion_factor)
    }

    /// The step-space target equivalent to `target` [deg], taking the short
    /// way from the current position.
    fn target_in_steps(&self, record: &MotorRecord, target: Degrees) -> f64 {
        let current = self.angle_of(record, record.position);
        let diff = wrap_at_180(target - current);
        record.position + diff / self.conversion_factor
    }

    pub async fn connect(&self) -> Result<()> {
        tokio::time::timeout(ATTACH_TIMEOUT, self.driver.connect())
            .await
            .map_err(|_| {
                MountError::hardware(format!(
                    "{:?} motor did not attach within {:?}",
                    self.axis, ATTACH_TIMEOUT
                ))
            })?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.driver.disconnect().await
    }

    /// Slew to `target` [deg] at the given rate. The velocity limit is the
    /// motor maximum scaled by the rate fraction.
    pub async fn move_to(&self, target: Degrees, slew_rate: SlewRate) -> Result<()> {
        let (target_steps, max_velocity) = {
            let mut record = self.record.lock().unwrap();
            record.state = MotorState::Slewing;
            (
                self.target_in_steps(&record, target),
                self.max_velocity * slew_rate.fraction(),
            )
        };
        self.driver
            .set_target_position_and_velocity(target_steps, max_velocity)
            .await
    }

    /// Move at constant velocity so the axis arrives at `target` [deg]
    /// after `timediff` seconds.
    pub async fn track(&self, target: Degrees, timediff: f64) -> Result<()> {
        let (target_steps, velocity) = {
            let record = self.record.lock().unwrap();
            let target_steps = self.target_in_steps(&record, target);
            let velocity = (record.position - target_steps) / timediff;
            (target_steps, velocity)
        };
        self.driver
            .set_target_position_and_velocity(target_steps, velocity)
            .await
    }

    /// Brake at maximum acceleration and come to rest at the natural
    /// stopping point. With the axis already at rest this issues nothing
    /// and the state settles straight into TRACKING.
    pub async fn stop_motion(&self) -> Result<()> {
        let command = {
            let mut record = self.record.lock().unwrap();
            if record.velocity == 0.0 {
                record.state = MotorState::Tracking;
                None
            } else {
                record.state = MotorState::Stopping;
                let accel = if record.velocity >= 0.0 {
                    -self.max_acceleration
                } else {
                    self.max_acceleration
                };
                let time_needed_to_stop = (record.velocity / accel).abs();
                let (stop_steps, _) = accelerated_pos_and_vel(
                    record.position,
                    record.velocity,
                    accel,
                    time_needed_to_stop,
                );
                let stop_angle = self.angle_of(&record, stop_steps);
                Some((
                    self.target_in_steps(&record, stop_angle),
                    record.velocity,
                ))
            }
        };
        match command {
            Some((target_steps, velocity)) => {
                self.driver
                    .set_target_position_and_velocity(target_steps, velocity)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Plan the slew to `target` [deg] without executing it and return its
    /// duration in seconds.
    pub fn estimate_slew_time(&self, target: Degrees) -> f64 {
        let record = self.record.lock().unwrap();
        let target_steps = self.target_in_steps(&record, target);
        let mut trajectory = Trajectory::new(self.max_acceleration);
        trajectory.plan(
            record.position,
            record.velocity,
            target_steps,
            self.max_velocity,
        );
        trajectory.total_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const MAX_VELOCITY: f64 = 100_000.0;
    const MAX_ACCELERATION: f64 = 50_000.0;

    /// Driver that records the last command instead of moving anything.
    struct RecordingDriver {
        record: SharedMotorRecord,
        last_command: Mutex<Option<(f64, f64)>>,
    }

    #[async_trait]
    impl StepperDriver for RecordingDriver {
        fn max_velocity(&self) -> f64 {
            MAX_VELOCITY
        }

        fn max_acceleration(&self) -> f64 {
            MAX_ACCELERATION
        }

        async fn connect(&self) -> Result<()> {
            self.record.lock().unwrap().attached = true;
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.record.lock().unwrap().attached = false;
            Ok(())
        }

        async fn set_target_position_and_velocity(
            &self,
            target_position: f64,
            max_velocity: f64,
        ) -> Result<()> {
            *self.last_command.lock().unwrap() = Some((target_position, max_velocity));
            Ok(())
        }
    }

    /// Driver whose hardware never reports attachment.
    struct UnresponsiveDriver;

    #[async_trait]
    impl StepperDriver for UnresponsiveDriver {
        fn max_velocity(&self) -> f64 {
            MAX_VELOCITY
        }

        fn max_acceleration(&self) -> f64 {
            MAX_ACCELERATION
        }

        async fn connect(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        async fn set_target_position_and_velocity(&self, _: f64, _: f64) -> Result<()> {
            Ok(())
        }
    }

    fn recording_motor(axis: Axis, conversion_factor: Degrees) -> (MotorController, SharedMotorRecord) {
        let record: SharedMotorRecord = Arc::new(Mutex::new(MotorRecord::default()));
        let driver = RecordingDriver {
            record: Arc::clone(&record),
            last_command: Mutex::new(None),
        };
        (
            MotorController::new(axis, conversion_factor, Box::new(driver), Arc::clone(&record)),
            record,
        )
    }

    #[tokio::test]
    async fn test_move_takes_shortest_path() {
        let record: SharedMotorRecord = Arc::new(Mutex::new(MotorRecord::default()));
        let driver = Arc::new(RecordingDriver {
            record: Arc::clone(&record),
            last_command: Mutex::new(None),
        });
        record.lock().unwrap().position = 1.0;
        let motor = MotorController::new(
            Axis::Az,
            1.0,
            Box::new(SharedDriver(Arc::clone(&driver))),
            Arc::clone(&record),
        );

        // From 1 deg to 359 deg the short way is -2 deg, not +358 deg.
        motor.move_to(359.0, SlewRate::High).await.unwrap();
        let (target, velocity) = driver.last_command.lock().unwrap().unwrap();
        assert_float_absolute_eq!(target, -1.0, 1e-9);
        assert_float_absolute_eq!(velocity, MAX_VELOCITY, 1e-9);
        assert_eq!(motor.state(), MotorState::Slewing);
    }

    /// Forwarding wrapper so a test can keep hold of the driver it hands
    /// to the controller.
    struct SharedDriver(Arc<RecordingDriver>);

    #[async_trait]
    impl StepperDriver for SharedDriver {
        fn max_velocity(&self) -> f64 {
            self.0.max_velocity()
        }

        fn max_acceleration(&self) -> f64 {
            self.0.max_acceleration()
        }

        async fn connect(&self) -> Result<()> {
            self.0.connect().await
        }

        async fn disconnect(&self) -> Result<()> {
            self.0.disconnect().await
        }

        async fn set_target_position_and_velocity(
            &self,
            target_position: f64,
            max_velocity: f64,
        ) -> Result<()> {
            self.0
                .set_target_position_and_velocity(target_position, max_velocity)
                .await
        }
    }

    #[test]
    fn test_position_wrap_ranges() {
        let (alt, alt_record) = recording_motor(Axis::Alt, 1.0);
        let (az, az_record) = recording_motor(Axis::Az, 1.0);

        alt_record.lock().unwrap().position = 190.0;
        az_record.lock().unwrap().position = 190.0;
        assert_float_absolute_eq!(alt.position(), -170.0, 1e-9);
        assert_float_absolute_eq!(az.position(), 190.0, 1e-9);

        alt_record.lock().unwrap().position = -10.0;
        az_record.lock().unwrap().position = -10.0;
        assert_float_absolute_eq!(alt.position(), -10.0, 1e-9);
        assert_float_absolute_eq!(az.position(), 350.0, 1e-9);
    }

    #[test]
    fn test_set_position_moves_the_offset() {
        let (motor, record) = recording_motor(Axis::Alt, 0.1);
        record.lock().unwrap().position = 100.0;
        motor.set_position(25.0);
        assert_float_absolute_eq!(motor.position(), 25.0, 1e-9);
        // The raw step count is untouched.
        assert_float_absolute_eq!(record.lock().unwrap().position, 100.0, 1e-9);
    }

    #[tokio::test]
    async fn test_stop_motion_at_rest_settles_into_tracking() {
        let (motor, record) = recording_motor(Axis::Alt, 1.0);
        record.lock().unwrap().state = MotorState::Slewing;
        motor.stop_motion().await.unwrap();
        assert_eq!(motor.state(), MotorState::Tracking);
    }

    #[tokio::test]
    async fn test_stop_motion_brakes_at_max_acceleration() {
        let record: SharedMotorRecord = Arc::new(Mutex::new(MotorRecord::default()));
        let driver = Arc::new(RecordingDriver {
            record: Arc::clone(&record),
            last_command: Mutex::new(None),
        });
        {
            let mut rec = record.lock().unwrap();
            rec.velocity = 1000.0;
            rec.state = MotorState::Slewing;
        }
        let motor = MotorController::new(
            Axis::Az,
            0.001,
            Box::new(SharedDriver(Arc::clone(&driver))),
            Arc::clone(&record),
        );

        motor.stop_motion().await.unwrap();
        assert_eq!(motor.state(), MotorState::Stopping);
        let (target, velocity) = driver.last_command.lock().unwrap().unwrap();
        // stop distance = v^2 / (2 a)
        assert_float_absolute_eq!(target, 1000.0 * 1000.0 / (2.0 * MAX_ACCELERATION), 1e-6);
        assert_float_absolute_eq!(velocity, 1000.0, 1e-9);
    }

    #[test]
    fn test_update_tracking_state() {
        let (motor, record) = recording_motor(Axis::Alt, 1.0);

        // STOPPED stays stopped.
        motor.update_tracking_state();
        assert_eq!(motor.state(), MotorState::Stopped);

        record.lock().unwrap().state = MotorState::Slewing;
        record.lock().unwrap().velocity = 500.0;
        motor.update_tracking_state();
        assert_eq!(motor.state(), MotorState::Slewing);

        record.lock().unwrap().velocity = 0.0;
        motor.update_tracking_state();
        assert_eq!(motor.state(), MotorState::Tracking);
    }

    #[test]
    fn test_estimate_slew_time() {
        let (motor, record) = recording_motor(Axis::Az, 0.1);
        record.lock().unwrap().position = 0.0;

        // 60 deg is 600 steps: a triangular profile of 2 * sqrt(600 / a).
        let estimate = motor.estimate_slew_time(60.0);
        assert_float_absolute_eq!(estimate, 2.0 * f64::sqrt(600.0 / MAX_ACCELERATION), 1e-9);

        // Already on target: nothing to do.
        assert_float_absolute_eq!(motor.estimate_slew_time(0.0), 0.0, 1e-9);
    }

    #[tokio::test]
    async fn test_connect_timeout_is_hardware_unavailable() {
        let record: SharedMotorRecord = Arc::new(Mutex::new(MotorRecord::default()));
        let motor = MotorController::new(
            Axis::Alt,
            1.0,
            Box::new(UnresponsiveDriver),
            Arc::clone(&record),
        );
        let result = motor.connect().await;
        assert!(matches!(result, Err(MountError::HardwareUnavailable(_))));
    }
}
