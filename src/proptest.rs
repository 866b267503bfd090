//! Strategies for property-based testing.
use crate::grid::{DirichletMask, VoxelField};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use std::ops::Range;

/// Grid shapes with every extent in `extents`.
pub fn grid_shape(extents: Range<usize>) -> impl Strategy<Value = [usize; 3]> {
    [extents.clone(), extents.clone(), extents]
}

/// Fields with the given layout and values drawn from `values`.
pub fn voxel_field(
    channels: usize,
    shape: [usize; 3],
    values: Range<f64>,
) -> impl Strategy<Value = VoxelField<f64>> {
    let n = channels * shape.iter().product::<usize>();
    vec(values, n).prop_map(move |values| {
        VoxelField::from_fn(channels, shape, |c, [i, j, k]| {
            values[c * shape[0] * shape[1] * shape[2] + i * shape[1] * shape[2] + j * shape[2] + k]
        })
    })
}

/// Random Dirichlet masks on the given grid, fixing roughly a quarter of the degrees of freedom.
pub fn dirichlet_mask(shape: [usize; 3]) -> impl Strategy<Value = DirichletMask> {
    let n = 3 * shape.iter().product::<usize>();
    vec(0..4u8, n).prop_map(move |draws| {
        let mut mask = VoxelField::from_element(3, shape, false);
        for (fixed, draw) in mask.as_mut_slice().iter_mut().zip(draws) {
            *fixed = draw == 0;
        }
        mask
    })
}

/// Pairs of a grid shape and a field on it.
pub fn shape_and_field(
    extents: Range<usize>,
    channels: usize,
    values: Range<f64>,
) -> impl Strategy<Value = ([usize; 3], VoxelField<f64>)> {
    grid_shape(extents).prop_flat_map(move |shape| (Just(shape), voxel_field(channels, shape, values.clone())))
}
