mod affine;
mod handler;

pub use affine::{
    compute_transformation_matrix, AffineTransformation, AlignmentPoint, AlignmentTriplet,
};
pub use handler::AlignmentHandler;
