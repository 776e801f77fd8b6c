use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CameraSettings;
use crate::coords::RaDec;
use crate::errors::{MountError, Result};

mod emulated;

pub use emulated::{EmulatedCamera, EmulatedPlateSolver};

/// A guide camera. Image data never leaves the solver, so the interface is
/// just lifecycle control.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self) -> Result<()>;
    async fn start_imaging(&self) -> Result<()>;
    async fn stop_imaging(&self) -> Result<()>;
}

/// Plate solver: takes an image through its camera and identifies the
/// equatorial coordinates of the image center.
#[async_trait]
pub trait PlateSolver: Send + Sync {
    async fn open_camera(&self) -> Result<()>;
    async fn start_imaging(&self) -> Result<()>;
    async fn stop_imaging(&self) -> Result<()>;

    /// Take an image and solve it. Fails with [`MountError::Solve`] when no
    /// image can be taken or its star pattern cannot be matched.
    async fn solve(&self) -> Result<RaDec>;
}

/// Build the plate solver from the camera configuration section. Backends
/// are keyed by their class-name tag.
pub fn create_plate_solver(settings: &CameraSettings) -> Result<Arc<dyn PlateSolver>> {
    match settings.class_name.as_str() {
        "emulated" => Ok(Arc::new(EmulatedPlateSolver::new(
            Box::new(EmulatedCamera::new()),
            settings.focal_length,
        ))),
        other => Err(MountError::hardware(format!(
            "no camera backend registered for class name {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_unknown_backend() {
        let settings = CameraSettings {
            class_name: "zwo".to_string(),
            focal_length: 25.0,
        };
        assert!(matches!(
            create_plate_solver(&settings),
            Err(MountError::HardwareUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_emulated_solver_fails_every_cycle() {
        let settings = CameraSettings {
            class_name: "emulated".to_string(),
            focal_length: 25.0,
        };
        let solver = create_plate_solver(&settings).unwrap();
        solver.open_camera().await.unwrap();
        solver.start_imaging().await.unwrap();
        assert!(matches!(solver.solve().await, Err(MountError::Solve(_))));
        solver.stop_imaging().await.unwrap();
    }
}
