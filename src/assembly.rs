//! Assembly of sparse matrices from linear operators that are only available through their action.
//!
//! An operator with a bounded stencil can be recovered exactly from a small number of
//! applications: each probe is an indicator field that is `1` on a strided sub-lattice of the grid
//! for a single input channel. As long as the stride (the *footprint*) exceeds the stencil
//! diameter, the responses to different probe points never overlap, and the response near each
//! probe point is precisely one column of the matrix.
//!
//! Only the centre and the 6 face neighbours of each probe point are read back. This matches the
//! 7-point stencils produced by [`derivative`](crate::stencil::derivative) composed with pointwise
//! operators, but an operator that couples diagonal neighbours would be silently truncated.
use crate::error::FdmError;
use crate::grid::{checked_coords, num_voxels, voxel_index, VoxelField};
use crate::operator::FieldOperator;
use crate::Real;
use itertools::iproduct;
use log::debug;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use std::time::Instant;

/// Offsets of the centre and the 6 face neighbours within the 3x3x3 neighbourhood.
fn face_neighbour_offsets() -> Vec<[isize; 3]> {
    iproduct!(-1..=1, -1..=1, -1..=1)
        .map(|(i, j, k)| [i, j, k])
        .filter(|offset| offset.iter().filter(|&&o| o != 0).count() <= 1)
        .collect()
}

/// Assembles [`FieldOperator`]s into [`CscMatrix`]es by probing them with strided indicator fields.
///
/// Rows and columns follow the flat `(channel, x, y, z)` numbering of [`VoxelField`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorAssembler {
    shape: [usize; 3],
    footprint: usize,
}

impl OperatorAssembler {
    pub const DEFAULT_FOOTPRINT: usize = 3;

    pub fn new(shape: [usize; 3]) -> Self {
        Self {
            shape,
            footprint: Self::DEFAULT_FOOTPRINT,
        }
    }

    /// Sets the stride between probe points along every axis.
    ///
    /// The footprint must be at least 3 so that the 3x3x3 neighbourhoods of distinct probe points
    /// only touch at their boundary, and never share a face neighbour.
    pub fn with_footprint(self, footprint: usize) -> Result<Self, FdmError> {
        if footprint < 3 {
            return Err(FdmError::InvalidFootprint(footprint));
        }
        Ok(Self { footprint, ..self })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn footprint(&self) -> usize {
        self.footprint
    }

    /// Computes the sparse matrix of the (linear) operator.
    ///
    /// The result has `output_channels * num_voxels` rows and `input_channels * num_voxels`
    /// columns. Entries that are exactly zero are not stored.
    pub fn assemble<T: Real>(&self, operator: &impl FieldOperator<T>) -> Result<CscMatrix<T>, FdmError> {
        let timer = Instant::now();
        let shape = self.shape;
        let f = self.footprint;
        let n = num_voxels(shape);
        let in_channels = operator.input_channels();
        let out_channels = operator.output_channels();
        let offsets = face_neighbour_offsets();

        let mut coo = CooMatrix::new(out_channels * n, in_channels * n);
        let mut num_probes = 0;
        for (i, j, k, c) in iproduct!(0..f, 0..f, 0..f, 0..in_channels) {
            // Probes starting outside the grid contain no points
            if i >= shape[0] || j >= shape[1] || k >= shape[2] {
                continue;
            }

            let probe = VoxelField::from_fn(in_channels, shape, |ch, [x, y, z]| {
                if ch == c && x % f == i && y % f == j && z % f == k {
                    T::one()
                } else {
                    T::zero()
                }
            });
            let response = operator.apply(&probe)?;
            response.check_layout(out_channels, shape, "operator response")?;
            num_probes += 1;

            let centroids = iproduct!(
                (i..shape[0]).step_by(f),
                (j..shape[1]).step_by(f),
                (k..shape[2]).step_by(f)
            );
            for (x, y, z) in centroids {
                let col = c * n + voxel_index(shape, [x, y, z]);
                for (c_out, offset) in iproduct!(0..out_channels, &offsets) {
                    let neighbour = [
                        x as isize + offset[0],
                        y as isize + offset[1],
                        z as isize + offset[2],
                    ];
                    if let Some(coords) = checked_coords(shape, neighbour) {
                        let row = c_out * n + voxel_index(shape, coords);
                        let value = response.as_slice()[row];
                        if value != T::zero() {
                            coo.push(row, col, value);
                        }
                    }
                }
            }
        }

        let matrix = CscMatrix::from(&coo);
        debug!(
            "Assembled {}x{} operator matrix ({} non-zeros) from {} probes in {:.3?}",
            matrix.nrows(),
            matrix.ncols(),
            matrix.nnz(),
            num_probes,
            timer.elapsed()
        );
        Ok(matrix)
    }
}
