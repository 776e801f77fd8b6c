use nalgebra::Matrix3;
use tracing::debug;

use super::affine::{
    compute_transformation_matrix, AffineTransformation, AlignmentPoint, AlignmentTriplet,
};
use crate::coords::AltAz;

/// The growing set of sky/telescope pointing pairs and the affine
/// transform derived from them.
///
/// With fewer than three points the transform is the identity. With
/// exactly three it is that triplet's transform. With more, every
/// 3-combination contributes; combinations whose matrix came out
/// non-finite are discarded and the rest are averaged element-wise.
#[derive(Debug, Clone)]
pub struct AlignmentHandler {
    points: Vec<AlignmentPoint>,
    matrix: Matrix3<f64>,
}

impl AlignmentHandler {
    pub fn new() -> Self {
        AlignmentHandler {
            points: Vec::new(),
            matrix: Matrix3::identity(),
        }
    }

    pub fn points(&self) -> &[AlignmentPoint] {
        &self.points
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        self.matrix
    }

    /// Add a paired pointing and refresh the cached matrix.
    pub fn add_alignment_point(&mut self, sky: AltAz, telescope: AltAz) {
        self.points.push(AlignmentPoint::new(sky, telescope));
        self.compute_transformation_matrix();
    }

    /// Recompute the cached matrix from the stored points. Idempotent for a
    /// fixed point set.
    pub fn compute_transformation_matrix(&mut self) {
        let mut matrices = Vec::new();
        for i in 0..self.points.len() {
            for j in i + 1..self.points.len() {
                for k in j + 1..self.points.len() {
                    matrices.push(compute_transformation_matrix(&AlignmentTriplet(
                        self.points[i],
                        self.points[j],
                        self.points[k],
                    )));
                }
            }
        }

        self.matrix = match matrices.len() {
            0 => Matrix3::identity(),
            1 => matrices[0],
            _ => {
                let finite: Vec<Matrix3<f64>> = matrices
                    .into_iter()
                    .filter(|m| m.iter().all(|value| value.is_finite()))
                    .collect();
                if finite.is_empty() {
                    Matrix3::identity()
                } else {
                    let mut sum = Matrix3::zeros();
                    for matrix in &finite {
                        sum += matrix;
                    }
                    sum / finite.len() as f64
                }
            }
        };
        debug!(points = self.points.len(), "Transformation matrix recomputed.");
    }

    /// Map a sky-frame pointing into the telescope frame.
    pub fn telescope_from_sky(&self, sky: AltAz) -> AltAz {
        AffineTransformation::new(self.matrix).matrix_transform(sky)
    }

    /// Map a telescope-frame pointing back into the sky frame.
    pub fn sky_from_telescope(&self, telescope: AltAz) -> AltAz {
        AffineTransformation::new(self.matrix).reverse_matrix_transform(telescope)
    }
}

impl Default for AlignmentHandler {
    fn default() -> Self {
        AlignmentHandler::new()
    }
}
