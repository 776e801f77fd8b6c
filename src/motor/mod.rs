use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::MotorSettings;
use crate::enums::Axis;
use crate::environment::Clock;
use crate::errors::{MountError, Result};

pub mod trajectory;

mod controller;
mod emulated;

pub use controller::{MotorController, MotorRecord, SharedMotorRecord, ATTACH_TIMEOUT};
pub use emulated::EmulatedStepper;

/// Hardware seam for a stepper motor.
///
/// Implementations report position and velocity asynchronously by writing
/// into the shared motor record they were constructed with; the only
/// command they accept is a target position with a velocity limit.
#[async_trait]
pub trait StepperDriver: Send + Sync {
    /// Maximum velocity [steps/sec].
    fn max_velocity(&self) -> f64;

    /// Maximum acceleration [steps/sec^2].
    fn max_acceleration(&self) -> f64;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Command the motor to move to `target_position` [steps]. The
    /// magnitude of `max_velocity` [steps/sec] caps the speed; the sign is
    /// not meaningful at this seam.
    async fn set_target_position_and_velocity(
        &self,
        target_position: f64,
        max_velocity: f64,
    ) -> Result<()>;
}

/// Build the motor for one axis from its configuration section. Backends
/// are keyed by their class-name tag.
pub fn create_motor(settings: &MotorSettings, axis: Axis, clock: Clock) -> Result<MotorController> {
    match settings.class_name.as_str() {
        "emulated" => {
            let record: SharedMotorRecord = Arc::new(Mutex::new(MotorRecord::default()));
            let driver = EmulatedStepper::new(Arc::clone(&record), clock, settings.hub_port);
            Ok(MotorController::new(
                axis,
                settings.gear_reduction,
                Box::new(driver),
                record,
            ))
        }
        other => Err(MountError::hardware(format!(
            "no motor backend registered for class name {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MountError;

    #[test]
    fn test_registry_rejects_unknown_backend() {
        let settings = MotorSettings {
            class_name: "phidgets".to_string(),
            hub_port: 0,
            gear_reduction: 0.00005625,
        };
        let result = create_motor(&settings, Axis::Alt, Clock::new());
        assert!(matches!(result, Err(MountError::HardwareUnavailable(_))));
    }

    #[test]
    fn test_registry_builds_emulated_backend() {
        let settings = MotorSettings {
            class_name: "emulated".to_string(),
            hub_port: 1,
            gear_reduction: 0.1,
        };
        let motor = create_motor(&settings, Axis::Az, Clock::new()).unwrap();
        assert_eq!(motor.axis(), Axis::Az);
        assert!(!motor.is_attached());
    }
}
