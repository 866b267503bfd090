//! Procedural generation of simple problems.
use crate::dirichlet::fixed_slice_mask;
use crate::elasticity::YoungPoisson;
use crate::error::FdmError;
use crate::grid::{VoxelField, VoxelGrid};
use crate::problem::ElasticityProblem;
use crate::stencil::Axis;
use crate::Real;

/// A block clamped at the first slice along `axis` and loaded with `force` (per voxel) on the
/// opposite slice.
pub fn clamped_block_problem<T: Real>(
    grid: VoxelGrid<T>,
    material: YoungPoisson<T>,
    axis: Axis,
    force: [T; 3],
) -> Result<ElasticityProblem<T>, FdmError> {
    let shape = grid.shape();
    let d = axis.index();
    let last = shape[d] - 1;
    let dirichlet = fixed_slice_mask(shape, axis, 0);
    let load = VoxelField::from_fn(3, shape, |c, coords| if coords[d] == last { force[c] } else { T::zero() });
    ElasticityProblem::new(grid, dirichlet, load, material)
}

/// A block clamped at the first slice along `axis` with the same force applied to every voxel.
pub fn uniformly_loaded_block_problem<T: Real>(
    grid: VoxelGrid<T>,
    material: YoungPoisson<T>,
    axis: Axis,
    force: [T; 3],
) -> Result<ElasticityProblem<T>, FdmError> {
    let shape = grid.shape();
    let dirichlet = fixed_slice_mask(shape, axis, 0);
    let load = VoxelField::from_fn(3, shape, |c, _| force[c]);
    ElasticityProblem::new(grid, dirichlet, load, material)
}
