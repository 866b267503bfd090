//! Finite difference stencils along grid axes, and their exact discrete adjoints.
//!
//! The 1D kernels operate on a single contiguous line of values and are exposed so that the
//! boundary cases can be inspected directly. [`derivative`] and [`derivative_adjoint`] apply them
//! to every line of a [`VoxelField`] along the chosen axis, for every channel.
use crate::error::FdmError;
use crate::grid::VoxelField;
use crate::Real;
use itertools::iproduct;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// A spatial axis of the voxel grid.
///
/// `X`, `Y` and `Z` correspond to the first, second and third grid axis respectively,
/// and to the first, second and third component of the grid spacing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// The difference stencil used to approximate first derivatives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DifferenceScheme {
    /// First-order forward differences, with a backward difference at the last voxel.
    #[default]
    Forward,
    /// Second-order central differences in the interior, one-sided differences at both ends.
    Central,
}

impl DifferenceScheme {
    /// The smallest number of voxels along an axis for which the derivative is defined.
    pub fn min_extent(&self) -> usize {
        match self {
            DifferenceScheme::Forward => 2,
            DifferenceScheme::Central => 3,
        }
    }
}

fn check_line<T>(u: &[T], out: &[T], min_len: usize) {
    assert_eq!(u.len(), out.len(), "Input and output lines must have the same length.");
    assert!(
        u.len() >= min_len,
        "Stencil needs at least {} values, got {}.",
        min_len,
        u.len()
    );
}

/// Forward differences $(u_{i+1} - u_i) / h$, with $(u_{n-1} - u_{n-2}) / h$ at the last index.
///
/// # Panics
///
/// Panics if the lines have different lengths or fewer than 2 entries.
pub fn forward_difference<T: Real>(u: &[T], h: T, du: &mut [T]) {
    check_line(u, du, 2);
    let n = u.len();
    for i in 0..n - 1 {
        du[i] = (u[i + 1] - u[i]) / h;
    }
    du[n - 1] = (u[n - 1] - u[n - 2]) / h;
}

/// The transpose of [`forward_difference`].
///
/// # Panics
///
/// Panics if the lines have different lengths or fewer than 2 entries.
pub fn forward_difference_adjoint<T: Real>(eps: &[T], h: T, u: &mut [T]) {
    check_line(eps, u, 2);
    let n = eps.len();
    for j in 0..n {
        let mut value = T::zero();
        if j >= 1 {
            value += eps[j - 1];
        }
        if j + 1 < n {
            value -= eps[j];
        }
        // The last row is a backward difference that touches the last two entries
        if j == n - 2 {
            value -= eps[n - 1];
        }
        if j == n - 1 {
            value += eps[n - 1];
        }
        u[j] = value / h;
    }
}

/// Central differences $(u_{i+1} - u_{i-1}) / 2h$ in the interior, with a forward difference
/// at the first index and a backward difference at the last.
///
/// For two entries both rows degenerate to the same one-sided difference.
///
/// # Panics
///
/// Panics if the lines have different lengths or fewer than 2 entries.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn central_difference<T: Real>(u: &[T], h: T, du: &mut [T]) {
    check_line(u, du, 2);
    let n = u.len();
    du[0] = (u[1] - u[0]) / h;
    for i in 1..n - 1 {
        du[i] = (u[i + 1] - u[i - 1]) / (2.0 * h);
    }
    du[n - 1] = (u[n - 1] - u[n - 2]) / h;
}

/// The transpose of [`central_difference`].
///
/// Lines of 4 or more entries use the interior stencil $(\epsilon_{j-1} - \epsilon_{j+1}) / 2h$
/// plus two special rows at each end. Lines of 2 and 3 entries use closed forms.
///
/// # Panics
///
/// Panics if the lines have different lengths or fewer than 2 entries.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn central_difference_adjoint<T: Real>(eps: &[T], h: T, u: &mut [T]) {
    check_line(eps, u, 2);
    let n = eps.len();
    let two_h = 2.0 * h;
    match n {
        2 => {
            u[0] = -(eps[0] + eps[1]) / h;
            u[1] = -u[0];
        }
        3 => {
            u[0] = -(2.0 * eps[0] + eps[1]) / two_h;
            u[1] = (eps[0] - eps[2]) / h;
            u[2] = (2.0 * eps[2] + eps[1]) / two_h;
        }
        _ => {
            u[0] = -(2.0 * eps[0] + eps[1]) / two_h;
            u[1] = (2.0 * eps[0] - eps[2]) / two_h;
            for j in 2..n - 2 {
                u[j] = (eps[j - 1] - eps[j + 1]) / two_h;
            }
            u[n - 2] = (eps[n - 3] - 2.0 * eps[n - 1]) / two_h;
            u[n - 1] = (2.0 * eps[n - 1] + eps[n - 2]) / two_h;
        }
    }
}

fn check_extent<T: Real>(u: &VoxelField<T>, axis: Axis, required: usize) -> Result<(), FdmError> {
    let extent = u.shape()[axis.index()];
    if extent < required {
        return Err(FdmError::GridTooSmall { axis, extent, required });
    }
    Ok(())
}

/// Applies a 1D kernel to every line of the field along the given axis.
fn map_lines<T: Real>(u: &VoxelField<T>, axis: Axis, kernel: impl Fn(&[T], &mut [T])) -> VoxelField<T> {
    let shape = u.shape();
    let d = axis.index();
    let n = shape[d];
    let stride: usize = shape[d + 1..].iter().product();

    let mut line_starts = shape;
    line_starts[d] = 1;

    let mut result = u.zeros_like();
    let mut input = vec![T::zero(); n];
    let mut output = vec![T::zero(); n];
    for (c, i, j, k) in iproduct!(0..u.channels(), 0..line_starts[0], 0..line_starts[1], 0..line_starts[2]) {
        let start = u.flat_index(c, [i, j, k]);
        for (m, v) in input.iter_mut().enumerate() {
            *v = u.as_slice()[start + m * stride];
        }
        kernel(&input, &mut output);
        let values = result.as_mut_slice();
        for (m, v) in output.iter().enumerate() {
            values[start + m * stride] = *v;
        }
    }
    result
}

/// The partial derivative of every channel of `u` along `axis`.
///
/// Fails with [`FdmError::GridTooSmall`] if the grid has fewer than
/// [`DifferenceScheme::min_extent`] voxels along the axis.
pub fn derivative<T: Real>(
    u: &VoxelField<T>,
    spacing: [T; 3],
    axis: Axis,
    scheme: DifferenceScheme,
) -> Result<VoxelField<T>, FdmError> {
    check_extent(u, axis, scheme.min_extent())?;
    let h = spacing[axis.index()];
    Ok(match scheme {
        DifferenceScheme::Forward => map_lines(u, axis, |line, out| forward_difference(line, h, out)),
        DifferenceScheme::Central => map_lines(u, axis, |line, out| central_difference(line, h, out)),
    })
}

/// The exact transpose of [`derivative`], applied to every channel of `eps`.
///
/// Accepts the same extents as [`derivative`].
pub fn derivative_adjoint<T: Real>(
    eps: &VoxelField<T>,
    spacing: [T; 3],
    axis: Axis,
    scheme: DifferenceScheme,
) -> Result<VoxelField<T>, FdmError> {
    check_extent(eps, axis, scheme.min_extent())?;
    let h = spacing[axis.index()];
    Ok(match scheme {
        DifferenceScheme::Forward => map_lines(eps, axis, |line, out| forward_difference_adjoint(line, h, out)),
        DifferenceScheme::Central => map_lines(eps, axis, |line, out| central_difference_adjoint(line, h, out)),
    })
}
