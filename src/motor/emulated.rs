//! Trajectory-following stand-in for a real stepper motor. The default
//! configured backend, and what the test suite drives.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::astro_math::modulo;
use crate::environment::Clock;
use crate::errors::Result;
use crate::motor::controller::SharedMotorRecord;
use crate::motor::trajectory::Trajectory;
use crate::motor::StepperDriver;

/// Maximum velocity of the emulated stepper [steps/sec].
pub const MAX_VELOCITY: f64 = 100_000.0;
/// Maximum acceleration of the emulated stepper [steps/sec^2].
pub const MAX_ACCELERATION: f64 = 50_000.0;
/// Interval between position and velocity reports [sec].
const DATA_INTERVAL: f64 = 0.1;

#[derive(Debug)]
struct Motion {
    trajectory: Trajectory,
    command_time: f64,
}

impl Motion {
    fn sample(&self, now: f64) -> (f64, f64) {
        self.trajectory.sample(now - self.command_time)
    }
}

/// Emulated stepper motor.
///
/// Commands are turned into a trajectory; a feedback task reports the
/// position and velocity along it into the shared motor record every
/// [`DATA_INTERVAL`], the way a real controller raises its change
/// callbacks.
pub struct EmulatedStepper {
    record: SharedMotorRecord,
    clock: Clock,
    hub_port: u8,
    motion: Arc<Mutex<Option<Motion>>>,
    feedback_task: Mutex<Option<JoinHandle<()>>>,
}

impl EmulatedStepper {
    pub fn new(record: SharedMotorRecord, clock: Clock, hub_port: u8) -> Self {
        EmulatedStepper {
            record,
            clock,
            hub_port,
            motion: Arc::new(Mutex::new(None)),
            feedback_task: Mutex::new(None),
        }
    }

    fn publish(record: &SharedMotorRecord, motion: &Mutex<Option<Motion>>, now: f64) {
        let sampled = motion.lock().unwrap().as_ref().map(|m| m.sample(now));
        if let Some((position, velocity)) = sampled {
            let mut record = record.lock().unwrap();
            record.position = position;
            record.velocity = velocity;
        }
    }
}

#[async_trait]
impl StepperDriver for EmulatedStepper {
    fn max_velocity(&self) -> f64 {
        MAX_VELOCITY
    }

    fn max_acceleration(&self) -> f64 {
        MAX_ACCELERATION
    }

    async fn connect(&self) -> Result<()> {
        debug!(hub_port = self.hub_port, "Attach stepper!");
        self.record.lock().unwrap().attached = true;

        let record = Arc::clone(&self.record);
        let motion = Arc::clone(&self.motion);
        let clock = self.clock.clone();
        let handle = tokio::spawn(async move {
            let start_time = clock.timestamp();
            loop {
                Self::publish(&record, &motion, clock.timestamp());
                // Sleep the remainder of the interval to avoid drift.
                let remainder = modulo(clock.timestamp() - start_time, DATA_INTERVAL);
                tokio::time::sleep(Duration::from_secs_f64(DATA_INTERVAL - remainder)).await;
            }
        });
        *self.feedback_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        debug!(hub_port = self.hub_port, "Detach stepper!");
        let handle = self.feedback_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.record.lock().unwrap().attached = false;
        Ok(())
    }

    async fn set_target_position_and_velocity(
        &self,
        target_position: f64,
        max_velocity: f64,
    ) -> Result<()> {
        let now = self.clock.timestamp();
        let mut motion = self.motion.lock().unwrap();

        // Start the new trajectory from the exact state at the command
        // time, not from the last published report.
        let (curr_pos, curr_vel) = match motion.as_ref() {
            Some(previous) => previous.sample(now),
            None => {
                let record = self.record.lock().unwrap();
                (record.position, record.velocity)
            }
        };

        let mut trajectory = Trajectory::new(MAX_ACCELERATION);
        let velocity_limit = max_velocity.abs().max(f64::EPSILON);
        trajectory.plan(curr_pos, curr_vel, target_position, velocity_limit);
        *motion = Some(Motion {
            trajectory,
            command_time: now,
        });
        Ok(())
    }
}
