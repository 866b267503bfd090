//! Regular voxel grids and multi-channel fields defined on them.
//!
//! A [`VoxelField`] stores `channels × nx × ny × nz` values in a single [`DVector`], in row-major
//! `(channel, x, y, z)` order. The flat index of channel `c` at voxel `(i, j, k)` is
//! `c * (nx * ny * nz) + i * (ny * nz) + j * nz + k`. All sparse matrices in this crate use the same
//! numbering for their rows and columns.
use crate::error::FdmError;
use crate::Real;
use itertools::iproduct;
use nalgebra::{DVector, Scalar};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A boolean mask over the three displacement components. `true` marks a fixed degree of freedom.
pub type DirichletMask = VoxelField<bool>;

/// Computes the flat voxel index of `(i, j, k)` in a grid of the given shape.
#[inline]
pub fn voxel_index(shape: [usize; 3], [i, j, k]: [usize; 3]) -> usize {
    debug_assert!(i < shape[0] && j < shape[1] && k < shape[2]);
    i * shape[1] * shape[2] + j * shape[2] + k
}

/// Inverse of [`voxel_index`].
#[inline]
pub fn voxel_coords(shape: [usize; 3], index: usize) -> [usize; 3] {
    let plane = shape[1] * shape[2];
    [index / plane, (index % plane) / shape[2], index % shape[2]]
}

/// Number of voxels in a grid of the given shape.
#[inline]
pub fn num_voxels(shape: [usize; 3]) -> usize {
    shape.iter().product()
}

/// Returns the (unsigned) coordinates if the signed coordinates lie inside the grid.
#[inline]
pub fn checked_coords(shape: [usize; 3], coords: [isize; 3]) -> Option<[usize; 3]> {
    let mut result = [0; 3];
    for d in 0..3 {
        if coords[d] < 0 || coords[d] as usize >= shape[d] {
            return None;
        }
        result[d] = coords[d] as usize;
    }
    Some(result)
}

/// A regular 3D voxel grid with per-axis spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct VoxelGrid<T> {
    shape: [usize; 3],
    spacing: [T; 3],
}

impl<T: Real> VoxelGrid<T> {
    pub fn new(shape: [usize; 3], spacing: [T; 3]) -> Result<Self, FdmError> {
        if shape.iter().any(|&n| n == 0) {
            return Err(FdmError::InvalidGrid(format!("shape {:?} has a zero extent", shape)));
        }
        if spacing.iter().any(|&h| !(h > T::zero())) {
            return Err(FdmError::InvalidGrid(format!(
                "spacing {:?} must be strictly positive",
                spacing
            )));
        }
        Ok(Self { shape, spacing })
    }

    /// A grid with unit spacing along every axis.
    pub fn with_unit_spacing(shape: [usize; 3]) -> Result<Self, FdmError> {
        Self::new(shape, [T::one(); 3])
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn spacing(&self) -> [T; 3] {
        self.spacing
    }

    pub fn num_voxels(&self) -> usize {
        num_voxels(self.shape)
    }

    pub fn voxel_index(&self, coords: [usize; 3]) -> usize {
        voxel_index(self.shape, coords)
    }

    pub fn voxel_coords(&self, index: usize) -> [usize; 3] {
        voxel_coords(self.shape, index)
    }

    pub fn contains(&self, coords: [isize; 3]) -> bool {
        checked_coords(self.shape, coords).is_some()
    }

    /// The grid obtained by adding `depth` voxels on both sides of every axis.
    ///
    /// The spacing is unchanged.
    pub fn padded(&self, depth: usize) -> Self {
        Self {
            shape: self.shape.map(|n| n + 2 * depth),
            spacing: self.spacing,
        }
    }
}

/// A field with a fixed number of channels on a voxel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelField<T: Scalar> {
    channels: usize,
    shape: [usize; 3],
    data: DVector<T>,
}

impl<T: Scalar> VoxelField<T> {
    pub fn from_element(channels: usize, shape: [usize; 3], value: T) -> Self {
        Self {
            channels,
            shape,
            data: DVector::from_element(channels * num_voxels(shape), value),
        }
    }

    /// Builds a field by evaluating `f(channel, [i, j, k])` for every entry.
    pub fn from_fn(channels: usize, shape: [usize; 3], mut f: impl FnMut(usize, [usize; 3]) -> T) -> Self {
        let values = iproduct!(0..channels, 0..shape[0], 0..shape[1], 0..shape[2])
            .map(|(c, i, j, k)| f(c, [i, j, k]))
            .collect::<Vec<_>>();
        Self {
            channels,
            shape,
            data: DVector::from_vec(values),
        }
    }

    /// Wraps a flat vector in `(channel, x, y, z)` order.
    pub fn from_vector(channels: usize, shape: [usize; 3], data: DVector<T>) -> Result<Self, FdmError> {
        let expected = channels * num_voxels(shape);
        if data.len() != expected {
            return Err(FdmError::shape_mismatch(format!(
                "vector of length {} cannot hold {} channels on a grid of shape {:?}",
                data.len(),
                channels,
                shape
            )));
        }
        Ok(Self { channels, shape, data })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn num_voxels(&self) -> usize {
        num_voxels(self.shape)
    }

    /// Total number of entries, `channels * num_voxels`.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_vector(&self) -> &DVector<T> {
        &self.data
    }

    pub fn as_vector_mut(&mut self) -> &mut DVector<T> {
        &mut self.data
    }

    pub fn into_vector(self) -> DVector<T> {
        self.data
    }

    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    /// Flat index of channel `c` at voxel `(i, j, k)`.
    pub fn flat_index(&self, c: usize, coords: [usize; 3]) -> usize {
        debug_assert!(c < self.channels);
        c * self.num_voxels() + voxel_index(self.shape, coords)
    }

    /// The values of a single channel as a contiguous slice.
    pub fn channel(&self, c: usize) -> &[T] {
        let n = self.num_voxels();
        &self.as_slice()[c * n..(c + 1) * n]
    }

    pub fn channel_mut(&mut self, c: usize) -> &mut [T] {
        let n = self.num_voxels();
        &mut self.as_mut_slice()[c * n..(c + 1) * n]
    }

    /// Whether the other field has the same number of channels and the same grid shape.
    pub fn same_layout<U: Scalar>(&self, other: &VoxelField<U>) -> bool {
        self.channels == other.channels && self.shape == other.shape
    }

    /// Checks that the field has the given number of channels and grid shape.
    pub fn check_layout(&self, channels: usize, shape: [usize; 3], what: &str) -> Result<(), FdmError> {
        if self.channels != channels || self.shape != shape {
            return Err(FdmError::shape_mismatch(format!(
                "{} has {} channels on shape {:?}, expected {} channels on shape {:?}",
                what, self.channels, self.shape, channels, shape
            )));
        }
        Ok(())
    }

    /// Copies `count` consecutive channels starting at `start` into a new field.
    pub fn channel_range(&self, start: usize, count: usize) -> Result<Self, FdmError> {
        if start + count > self.channels {
            return Err(FdmError::shape_mismatch(format!(
                "channels {}..{} requested from a field with {} channels",
                start,
                start + count,
                self.channels
            )));
        }
        let n = self.num_voxels();
        let data = DVector::from_column_slice(&self.as_slice()[start * n..(start + count) * n]);
        Ok(Self {
            channels: count,
            shape: self.shape,
            data,
        })
    }

    /// Stacks the channels of all fields, in order. All fields must share a grid shape.
    pub fn concat_channels(fields: &[&Self]) -> Result<Self, FdmError> {
        let shape = fields
            .first()
            .map(|f| f.shape)
            .ok_or_else(|| FdmError::shape_mismatch("cannot concatenate an empty list of fields"))?;
        let mut values = Vec::with_capacity(fields.iter().map(|f| f.len()).sum());
        let mut channels = 0;
        for field in fields {
            if field.shape != shape {
                return Err(FdmError::shape_mismatch(format!(
                    "cannot concatenate fields of shape {:?} and {:?}",
                    shape, field.shape
                )));
            }
            channels += field.channels;
            values.extend_from_slice(field.as_slice());
        }
        Ok(Self {
            channels,
            shape,
            data: DVector::from_vec(values),
        })
    }

    pub fn map<U: Scalar>(&self, f: impl FnMut(T) -> U) -> VoxelField<U> {
        VoxelField {
            channels: self.channels,
            shape: self.shape,
            data: self.data.map(f),
        }
    }

    /// Overwrites every entry where the mask is `true` with `value`.
    pub fn fill_masked(&mut self, mask: &VoxelField<bool>, value: T) -> Result<(), FdmError> {
        mask.check_layout(self.channels, self.shape, "mask")?;
        for (v, &fixed) in self.data.iter_mut().zip(mask.data.iter()) {
            if fixed {
                *v = value.clone();
            }
        }
        Ok(())
    }

    /// Surrounds the field by `depth` voxels of `value` on both sides of every axis.
    pub fn padded(&self, depth: usize, value: T) -> Self {
        if depth == 0 {
            return self.clone();
        }
        let padded_shape = self.shape.map(|n| n + 2 * depth);
        let mut result = Self::from_element(self.channels, padded_shape, value);
        for (c, i, j, k) in iproduct!(0..self.channels, 0..self.shape[0], 0..self.shape[1], 0..self.shape[2]) {
            let target = result.flat_index(c, [i + depth, j + depth, k + depth]);
            result.data[target] = self.data[self.flat_index(c, [i, j, k])].clone();
        }
        result
    }

    /// Removes `depth` voxels from both sides of every axis, undoing [`padded`](Self::padded).
    pub fn unpadded(&self, depth: usize) -> Result<Self, FdmError> {
        if depth == 0 {
            return Ok(self.clone());
        }
        if self.shape.iter().any(|&n| n <= 2 * depth) {
            return Err(FdmError::shape_mismatch(format!(
                "cannot strip {} voxels of padding from a field of shape {:?}",
                depth, self.shape
            )));
        }
        let inner = self.shape.map(|n| n - 2 * depth);
        Ok(Self::from_fn(self.channels, inner, |c, [i, j, k]| {
            self.data[self.flat_index(c, [i + depth, j + depth, k + depth])].clone()
        }))
    }
}

impl<T: Real> VoxelField<T> {
    pub fn zeros(channels: usize, shape: [usize; 3]) -> Self {
        Self::from_element(channels, shape, T::zero())
    }

    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.channels, self.shape)
    }

    /// Euclidean inner product of two fields with identical layout.
    pub fn dot(&self, other: &Self) -> Result<T, FdmError> {
        other.check_layout(self.channels, self.shape, "right operand of inner product")?;
        Ok(self.data.dot(&other.data))
    }

    /// Multiplies every channel pointwise by the one-channel field `weights`.
    pub fn scale_voxels(&mut self, weights: &Self) -> Result<(), FdmError> {
        weights.check_layout(1, self.shape, "voxel weights")?;
        let n = self.num_voxels();
        for chunk in self.data.as_mut_slice().chunks_mut(n) {
            for (v, w) in chunk.iter_mut().zip(weights.as_slice()) {
                *v *= *w;
            }
        }
        Ok(())
    }

    /// Sums the channels into a one-channel field.
    pub fn sum_channels(&self) -> Self {
        let mut result = Self::zeros(1, self.shape);
        for c in 0..self.channels {
            for (r, v) in result.data.iter_mut().zip(self.channel(c)) {
                *r += *v;
            }
        }
        result
    }

    pub fn min_value(&self) -> Option<T> {
        self.data.iter().copied().reduce(|a, b| a.min(b))
    }

    pub fn max_value(&self) -> Option<T> {
        self.data.iter().copied().reduce(|a, b| a.max(b))
    }
}

impl<T: Scalar> Index<(usize, usize, usize, usize)> for VoxelField<T> {
    type Output = T;

    fn index(&self, (c, i, j, k): (usize, usize, usize, usize)) -> &T {
        &self.data[self.flat_index(c, [i, j, k])]
    }
}

impl<T: Scalar> IndexMut<(usize, usize, usize, usize)> for VoxelField<T> {
    fn index_mut(&mut self, (c, i, j, k): (usize, usize, usize, usize)) -> &mut T {
        let index = self.flat_index(c, [i, j, k]);
        &mut self.data[index]
    }
}
