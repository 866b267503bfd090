use nalgebra::RealField;

pub use nalgebra;

/// Scalar type used throughout `voxfdm`.
///
/// Trait alias for real-valued, copyable `nalgebra` scalars such as `f32` and `f64`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
