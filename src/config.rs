use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::enums::ControllerMode;
use crate::errors::{MountError, Result};

/* Config */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    pub alt: Option<MotorSettings>,
    pub az: Option<MotorSettings>,
    pub camera: Option<CameraSettings>,
}

/* Motor axis settings */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MotorSettings {
    /// Registry tag of the motor backend.
    pub class_name: String,
    #[serde(default)]
    pub hub_port: u8,
    /// Gear reduction as the angle per motor step [deg/step].
    pub gear_reduction: f64,
}

/* Camera settings */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CameraSettings {
    /// Registry tag of the camera backend.
    pub class_name: String,
    /// Focal length of the camera lens [mm].
    pub focal_length: f64,
}

// 200 steps per revolution, 16 microsteps per step and a 2000x gear
// reduction.
const DEFAULT_GEAR_REDUCTION: f64 = 0.00005625;

impl Default for Config {
    fn default() -> Self {
        Config {
            alt: Some(MotorSettings {
                class_name: "emulated".to_string(),
                hub_port: 0,
                gear_reduction: DEFAULT_GEAR_REDUCTION,
            }),
            az: Some(MotorSettings {
                class_name: "emulated".to_string(),
                hub_port: 1,
                gear_reduction: DEFAULT_GEAR_REDUCTION,
            }),
            camera: Some(CameraSettings {
                class_name: "emulated".to_string(),
                focal_length: 25.0,
            }),
        }
    }
}

impl Config {
    /// Load the configuration from a JSON file, falling back to the default
    /// emulated setup when the file does not exist.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            info!(?path, "No configuration file found, using the emulated setup.");
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| MountError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (section, motor) in [("alt", &self.alt), ("az", &self.az)] {
            if let Some(motor) = motor {
                if motor.class_name.is_empty() {
                    return Err(MountError::Config(format!(
                        "{section}: class-name must not be empty"
                    )));
                }
                if motor.gear_reduction <= 0.0 {
                    return Err(MountError::Config(format!(
                        "{section}: gear-reduction must be positive, got {}",
                        motor.gear_reduction
                    )));
                }
            }
        }
        if let Some(camera) = &self.camera {
            if camera.class_name.is_empty() {
                return Err(MountError::Config(
                    "camera: class-name must not be empty".to_string(),
                ));
            }
            if camera.focal_length <= 0.0 {
                return Err(MountError::Config(format!(
                    "camera: focal-length must be positive, got {}",
                    camera.focal_length
                )));
            }
        }
        Ok(())
    }

    /// The controller mode the configured sections support. Both motor
    /// sections are needed for the mount to count as motorized.
    pub fn controller_mode(&self) -> ControllerMode {
        let motors = self.alt.is_some() && self.az.is_some();
        match (motors, self.camera.is_some()) {
            (true, true) => ControllerMode::CameraAndMotors,
            (true, false) => ControllerMode::MotorsOnly,
            (false, true) => ControllerMode::CameraOnly,
            (false, false) => ControllerMode::None,
        }
    }
}
