use crate::errors::{MountError, Result};

/// What the controller has to work with, determined at startup from the
/// configured capabilities. Degrades monotonically on hardware errors.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ControllerMode {
    None,
    MotorsOnly,
    CameraOnly,
    CameraAndMotors,
}

impl ControllerMode {
    pub fn has_motors(&self) -> bool {
        matches!(
            self,
            ControllerMode::MotorsOnly | ControllerMode::CameraAndMotors
        )
    }

    pub fn has_camera(&self) -> bool {
        matches!(
            self,
            ControllerMode::CameraOnly | ControllerMode::CameraAndMotors
        )
    }

    /// The mode left after the motors drop out.
    pub fn without_motors(self) -> Self {
        match self {
            ControllerMode::CameraAndMotors => ControllerMode::CameraOnly,
            ControllerMode::MotorsOnly => ControllerMode::None,
            other => other,
        }
    }

    /// The mode left after the camera drops out.
    pub fn without_camera(self) -> Self {
        match self {
            ControllerMode::CameraAndMotors => ControllerMode::MotorsOnly,
            ControllerMode::CameraOnly => ControllerMode::None,
            other => other,
        }
    }
}

/// Lifecycle of a single motor axis.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MotorState {
    Stopped,
    Slewing,
    Stopping,
    Tracking,
}

/// Discrete slew rate scale [deg/sec]. The per-move velocity limit is the
/// motor maximum scaled by `value / HIGH`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SlewRate {
    Centering,
    Guiding,
    Find,
    High,
}

impl SlewRate {
    pub fn value(&self) -> f64 {
        match self {
            SlewRate::Centering => 0.5,
            SlewRate::Guiding => 1.0,
            SlewRate::Find => 2.0,
            SlewRate::High => 3.0,
        }
    }

    /// Fraction of the maximum motor velocity this rate corresponds to.
    pub fn fraction(&self) -> f64 {
        self.value() / SlewRate::High.value()
    }

    pub fn from_command(cmd: &str) -> Result<Self> {
        match cmd {
            "RC" => Ok(SlewRate::Centering),
            "RG" => Ok(SlewRate::Guiding),
            "RM" => Ok(SlewRate::Find),
            "RS" => Ok(SlewRate::High),
            other => Err(MountError::invalid_argument(format!(
                "unknown slew rate command {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlewDirection {
    Up,
    Down,
    Left,
    Right,
    None,
}

/// The two mount axes. Altitude reads wrap at +/-180 deg, azimuth at 360 deg.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Axis {
    Alt,
    Az,
}

impl Axis {
    pub fn wrap(&self, angle: f64) -> f64 {
        match self {
            Axis::Alt => crate::astro_math::wrap_at_180(angle),
            Axis::Az => crate::astro_math::wrap_at_360(angle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_degradation() {
        assert_eq!(
            ControllerMode::CameraAndMotors.without_motors(),
            ControllerMode::CameraOnly
        );
        assert_eq!(
            ControllerMode::MotorsOnly.without_motors(),
            ControllerMode::None
        );
        assert_eq!(
            ControllerMode::CameraAndMotors.without_camera(),
            ControllerMode::MotorsOnly
        );
        assert_eq!(
            ControllerMode::CameraOnly.without_camera(),
            ControllerMode::None
        );
        assert_eq!(ControllerMode::None.without_motors(), ControllerMode::None);
    }

    #[test]
    fn test_slew_rate_fractions() {
        assert_float_absolute_eq!(SlewRate::High.fraction(), 1.0);
        assert_float_absolute_eq!(SlewRate::Find.fraction(), 2.0 / 3.0);
        assert_float_absolute_eq!(SlewRate::Guiding.fraction(), 1.0 / 3.0);
        assert_float_absolute_eq!(SlewRate::Centering.fraction(), 1.0 / 6.0);
    }

    #[test]
    fn test_slew_rate_from_command() {
        assert_eq!(SlewRate::from_command("RS").unwrap(), SlewRate::High);
        assert!(SlewRate::from_command("RX").is_err());
    }

    #[test]
    fn test_axis_wrap() {
        assert_float_absolute_eq!(Axis::Alt.wrap(359.0), -1.0);
        assert_float_absolute_eq!(Axis::Az.wrap(-1.0), 359.0);
    }
}
