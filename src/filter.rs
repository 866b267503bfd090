//! The boundary to density filters.
//!
//! Filtering itself is done elsewhere. The solver only relies on filtered densities lying in
//! `[0, 1]`, which [`filter_density`] enforces.
use crate::error::FdmError;
use crate::grid::VoxelField;
use crate::problem::check_density_range;
use crate::Real;

/// Maps a raw density field to a filtered density field of the same shape.
pub trait DensityFilter<T: Real> {
    fn filter(&self, density: &VoxelField<T>) -> VoxelField<T>;
}

impl<T, F> DensityFilter<T> for F
where
    T: Real,
    F: Fn(&VoxelField<T>) -> VoxelField<T>,
{
    fn filter(&self, density: &VoxelField<T>) -> VoxelField<T> {
        self(density)
    }
}

/// A filter that returns its input.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct IdentityFilter;

impl<T: Real> DensityFilter<T> for IdentityFilter {
    fn filter(&self, density: &VoxelField<T>) -> VoxelField<T> {
        density.clone()
    }
}

/// Applies the filter and checks its contract.
///
/// Fails with [`FdmError::ShapeMismatch`] if the filter changes the layout of the field, and with
/// [`FdmError::DensityOutOfRange`] if any filtered value lies outside `[0, 1]`.
pub fn filter_density<T: Real>(
    filter: &impl DensityFilter<T>,
    density: &VoxelField<T>,
) -> Result<VoxelField<T>, FdmError> {
    let filtered = filter.filter(density);
    filtered.check_layout(density.channels(), density.shape(), "filtered density")?;
    check_density_range(&filtered)?;
    Ok(filtered)
}
