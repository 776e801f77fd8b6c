use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::trace;

use crate::camera::{Camera, PlateSolver};
use crate::coords::RaDec;
use crate::errors::{MountError, Result};

// Sensor geometry of the emulated camera.
const IMAGE_WIDTH: u32 = 1280;
const IMAGE_HEIGHT: u32 = 960;
const PIXEL_SIZE_UM: f64 = 3.76;

/// Camera that produces starless frames.
pub struct EmulatedCamera;

impl EmulatedCamera {
    pub fn new() -> Self {
        EmulatedCamera
    }
}

impl Default for EmulatedCamera {
    fn default() -> Self {
        EmulatedCamera::new()
    }
}

#[async_trait]
impl Camera for EmulatedCamera {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn start_imaging(&self) -> Result<()> {
        Ok(())
    }

    async fn stop_imaging(&self) -> Result<()> {
        Ok(())
    }
}

/// Plate solver for the emulated camera.
///
/// Exposures take a jittered fraction of a second, and the frames never
/// contain stars, so every cycle fails and the previously solved position
/// stays in effect. This paces the solve loop the way a real solver does.
pub struct EmulatedPlateSolver {
    camera: Box<dyn Camera>,
    /// Estimated field of view [deg], derived from the sensor and the
    /// configured focal length.
    fov_estimate: f64,
}

impl EmulatedPlateSolver {
    pub fn new(camera: Box<dyn Camera>, focal_length: f64) -> Self {
        let min_img_size = IMAGE_WIDTH.min(IMAGE_HEIGHT) as f64;
        let fov_estimate = min_img_size * PIXEL_SIZE_UM * 202.265 / focal_length / 3600.0;
        EmulatedPlateSolver {
            camera,
            fov_estimate,
        }
    }
}

#[async_trait]
impl PlateSolver for EmulatedPlateSolver {
    async fn open_camera(&self) -> Result<()> {
        self.camera.open().await
    }

    async fn start_imaging(&self) -> Result<()> {
        self.camera.start_imaging().await
    }

    async fn stop_imaging(&self) -> Result<()> {
        self.camera.stop_imaging().await
    }

    async fn solve(&self) -> Result<RaDec> {
        let exposure_millis = rand::thread_rng().gen_range(150..250);
        trace!(
            exposure_millis,
            fov_estimate = self.fov_estimate,
            "Exposing an emulated frame."
        );
        tokio::time::sleep(Duration::from_millis(exposure_millis)).await;
        Err(MountError::Solve(
            "no stars in the emulated image".to_string(),
        ))
    }
}
