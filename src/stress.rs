//! Von Mises stress of voxel stress fields.
use crate::elasticity::STRAIN_CHANNELS;
use crate::error::FdmError;
use crate::grid::{voxel_index, VoxelField};
use crate::Real;
use numeric_literals::replace_float_literals;

/// Small floor added under the square root, keeping the von Mises stress differentiable at zero.
pub const VON_MISES_EPSILON: f64 = 1e-9;

/// The von Mises stress of a 9-channel stress field.
///
/// With the stress components $\sigma_{ij}$ stored at channel `3i + j`,
/// $$
/// \sigma_{vm} = \sqrt{\tfrac{1}{2}\left[(\sigma_{00} - \sigma_{11})^2 + (\sigma_{11} - \sigma_{22})^2
///   + (\sigma_{22} - \sigma_{00})^2 + 6(\sigma_{01}^2 + \sigma_{02}^2 + \sigma_{12}^2)\right] + \epsilon}.
/// $$
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn von_mises_stress<T: Real>(sigma: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
    if sigma.channels() != STRAIN_CHANNELS {
        return Err(FdmError::shape_mismatch(format!(
            "von Mises stress needs {} stress channels, got {}",
            STRAIN_CHANNELS,
            sigma.channels()
        )));
    }
    let eps = T::from_f64(VON_MISES_EPSILON).expect("literal must fit in T");
    let s = |c: usize, v: usize| sigma.channel(c)[v];
    Ok(VoxelField::from_fn(1, sigma.shape(), |_, coords| {
        let v = voxel_index(sigma.shape(), coords);
        let normal = (s(0, v) - s(4, v)).powi(2) + (s(4, v) - s(8, v)).powi(2) + (s(8, v) - s(0, v)).powi(2);
        let shear = s(1, v).powi(2) + s(2, v).powi(2) + s(5, v).powi(2);
        (0.5 * (normal + 6.0 * shear) + eps).sqrt()
    }))
}

/// The von Mises stress of every field in a batch, e.g. the stresses of several solutions.
///
/// Fails on the first field that does not have 9 channels.
pub fn von_mises_stress_batch<T: Real>(stresses: &[VoxelField<T>]) -> Result<Vec<VoxelField<T>>, FdmError> {
    stresses.iter().map(von_mises_stress).collect()
}
