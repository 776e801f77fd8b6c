//! Affine transforms between the sky AltAz frame and the telescope frame.
//!
//! A mount that is not perfectly level points along directions that differ
//! from the true sky by roughly an affine map in (az, alt). Three paired
//! pointings pin that map down; the homogeneous 3x3 matrix representation
//! makes applying and inverting it plain linear algebra.

use nalgebra::{Matrix3, Vector3};

use crate::coords::AltAz;

/// A paired pointing: where the sky target really is and where the
/// telescope reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentPoint {
    pub sky: AltAz,
    pub telescope: AltAz,
}

impl AlignmentPoint {
    pub fn new(sky: AltAz, telescope: AltAz) -> Self {
        AlignmentPoint { sky, telescope }
    }
}

/// Three alignment points, enough to determine an affine transform.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentTriplet(pub AlignmentPoint, pub AlignmentPoint, pub AlignmentPoint);

fn homogeneous(alt_az: AltAz) -> Vector3<f64> {
    Vector3::new(alt_az.az, alt_az.alt, 1.0)
}

fn from_homogeneous(v: Vector3<f64>) -> AltAz {
    AltAz::new(v.y, v.x)
}

/// The affine matrix mapping the triplet's sky coordinates onto its
/// telescope coordinates.
///
/// A degenerate triplet (collinear sky pointings) has no unique transform;
/// the returned matrix then contains non-finite entries and the caller is
/// expected to discard it.
pub fn compute_transformation_matrix(triplet: &AlignmentTriplet) -> Matrix3<f64> {
    let sky = Matrix3::from_columns(&[
        homogeneous(triplet.0.sky),
        homogeneous(triplet.1.sky),
        homogeneous(triplet.2.sky),
    ]);
    let telescope = Matrix3::from_columns(&[
        homogeneous(triplet.0.telescope),
        homogeneous(triplet.1.telescope),
        homogeneous(triplet.2.telescope),
    ]);
    match sky.try_inverse() {
        Some(inverse) => telescope * inverse,
        None => Matrix3::from_element(f64::NAN),
    }
}

/// Applies a computed matrix in either direction.
#[derive(Debug, Clone)]
pub struct AffineTransformation {
    matrix: Matrix3<f64>,
}

impl AffineTransformation {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        AffineTransformation { matrix }
    }

    /// Sky frame to telescope frame.
    pub fn matrix_transform(&self, sky: AltAz) -> AltAz {
        from_homogeneous(self.matrix * homogeneous(sky))
    }

    /// Telescope frame back to the sky frame.
    pub fn reverse_matrix_transform(&self, telescope: AltAz) -> AltAz {
        let inverse = self.matrix.try_inverse().unwrap_or_else(Matrix3::identity);
        from_homogeneous(inverse * homogeneous(telescope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // An exactly affine-related triplet: rotation plus scale plus offset.
    fn exact_triplet() -> AlignmentTriplet {
        AlignmentTriplet(
            AlignmentPoint::new(AltAz::new(1.0, 1.0), AltAz::new(5.732050807, 2.4142135623)),
            AlignmentPoint::new(AltAz::new(2.0, 1.0), AltAz::new(6.665063509, 2.7677669529)),
            AlignmentPoint::new(AltAz::new(1.0, 2.0), AltAz::new(5.665063509, 2.7677669529)),
        )
    }

    #[test]
    fn test_matrix_maps_the_triplet_exactly() {
        let triplet = exact_triplet();
        let transformation = AffineTransformation::new(compute_transformation_matrix(&triplet));
        for point in [triplet.0, triplet.1, triplet.2] {
            let telescope = transformation.matrix_transform(point.sky);
            assert_float_absolute_eq!(telescope.alt, point.telescope.alt, 1e-9);
            assert_float_absolute_eq!(telescope.az, point.telescope.az, 1e-9);
        }
    }

    #[test]
    fn test_reverse_undoes_forward() {
        let transformation =
            AffineTransformation::new(compute_transformation_matrix(&exact_triplet()));
        let sky = AltAz::new(48.0, 212.5);
        let round_trip = transformation.reverse_matrix_transform(transformation.matrix_transform(sky));
        assert_float_absolute_eq!(round_trip.alt, sky.alt, 1e-9);
        assert_float_absolute_eq!(round_trip.az, sky.az, 1e-9);
    }

    #[test]
    fn test_collinear_sky_points_are_degenerate() {
        let triplet = AlignmentTriplet(
            AlignmentPoint::new(AltAz::new(1.0, 1.0), AltAz::new(1.5, 1.5)),
            AlignmentPoint::new(AltAz::new(2.0, 2.0), AltAz::new(2.5, 2.5)),
            AlignmentPoint::new(AltAz::new(3.0, 3.0), AltAz::new(3.5, 3.5)),
        );
        let matrix = compute_transformation_matrix(&triplet);
        assert!(matrix.iter().any(|value| !value.is_finite()));
    }

    #[test]
    fn test_identity_matrix_is_a_no_op() {
        let transformation = AffineTransformation::new(Matrix3::identity());
        let pointing = AltAz::new(5.732050807, 2.4142135623);
        assert_eq!(transformation.matrix_transform(pointing), pointing);
        assert_eq!(transformation.reverse_matrix_transform(pointing), pointing);
    }
}
