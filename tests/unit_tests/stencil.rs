use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DMatrix;
use proptest::collection::vec;
use proptest::prelude::*;
use voxfdm::proptest::voxel_field;
use voxfdm::stencil::{
    central_difference, central_difference_adjoint, derivative, derivative_adjoint, forward_difference,
    forward_difference_adjoint, Axis, DifferenceScheme,
};
use voxfdm::{FdmError, VoxelField};

type Kernel = fn(&[f64], f64, &mut [f64]);

/// The dense matrix of a 1D kernel, obtained by applying it to unit vectors.
fn kernel_matrix(kernel: Kernel, n: usize, h: f64) -> DMatrix<f64> {
    let mut matrix = DMatrix::zeros(n, n);
    let mut e = vec![0.0; n];
    let mut column = vec![0.0; n];
    for j in 0..n {
        e[j] = 1.0;
        kernel(&e, h, &mut column);
        matrix.column_mut(j).copy_from_slice(&column);
        e[j] = 0.0;
    }
    matrix
}

#[test]
fn forward_difference_small_example() {
    let u = [1.0, 4.0, 9.0, 16.0];
    let mut du = [0.0; 4];
    forward_difference(&u, 0.5, &mut du);
    // The last entry repeats the backward difference
    assert_eq!(du, [6.0, 10.0, 14.0, 14.0]);
}

#[test]
fn central_difference_small_example() {
    let u = [1.0, 4.0, 9.0, 16.0];
    let mut du = [0.0; 4];
    central_difference(&u, 1.0, &mut du);
    assert_eq!(du, [3.0, 4.0, 6.0, 7.0]);
}

#[test]
fn adjoint_kernels_are_exact_transposes() {
    let h = 0.7;
    for n in 2..9 {
        for (kernel, adjoint) in [
            (forward_difference as Kernel, forward_difference_adjoint as Kernel),
            (central_difference as Kernel, central_difference_adjoint as Kernel),
        ] {
            let d = kernel_matrix(kernel, n, h);
            let d_adj = kernel_matrix(adjoint, n, h);
            assert_matrix_eq!(d_adj, d.transpose(), comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn central_adjoint_thin_lines_closed_forms() {
    let h = 2.0;
    let mut u = [0.0; 2];
    central_difference_adjoint(&[1.0, 3.0], h, &mut u);
    assert_eq!(u, [-2.0, 2.0]);

    let mut u = [0.0; 3];
    central_difference_adjoint(&[1.0, 2.0, 4.0], h, &mut u);
    assert_eq!(u, [-1.0, -1.5, 2.5]);
}

#[test]
fn derivative_is_exact_for_linear_fields() {
    let spacing = [0.5, 2.0, 0.25];
    let shape = [4, 3, 5];
    let slopes = [2.0, -3.0, 0.5];
    // u_c(x) = (c + 1) * (slopes . x)
    let u = VoxelField::from_fn(2, shape, |c, [i, j, k]| {
        let x = [i as f64 * spacing[0], j as f64 * spacing[1], k as f64 * spacing[2]];
        (c + 1) as f64 * (slopes[0] * x[0] + slopes[1] * x[1] + slopes[2] * x[2])
    });

    for scheme in [DifferenceScheme::Forward, DifferenceScheme::Central] {
        for axis in Axis::ALL {
            let du = derivative(&u, spacing, axis, scheme).unwrap();
            let expected = VoxelField::from_fn(2, shape, |c, _| (c + 1) as f64 * slopes[axis.index()]);
            assert_matrix_eq!(du.into_vector(), expected.into_vector(), comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn derivative_rejects_too_thin_grids() {
    let u = VoxelField::<f64>::zeros(3, [4, 2, 1]);
    let spacing = [1.0; 3];

    assert!(derivative(&u, spacing, Axis::Y, DifferenceScheme::Forward).is_ok());
    assert!(matches!(
        derivative(&u, spacing, Axis::Y, DifferenceScheme::Central),
        Err(FdmError::GridTooSmall {
            axis: Axis::Y,
            extent: 2,
            required: 3
        })
    ));
    assert!(matches!(
        derivative(&u, spacing, Axis::Z, DifferenceScheme::Forward),
        Err(FdmError::GridTooSmall {
            axis: Axis::Z,
            extent: 1,
            required: 2
        })
    ));
    assert!(derivative_adjoint(&u, spacing, Axis::Z, DifferenceScheme::Forward).is_err());
}

#[test]
fn derivative_adjoint_shares_the_domain_of_derivative() {
    let eps = VoxelField::<f64>::zeros(2, [4, 2, 3]);
    let spacing = [1.0; 3];
    for scheme in [DifferenceScheme::Forward, DifferenceScheme::Central] {
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            assert_eq!(
                derivative(&eps, spacing, axis, scheme).is_ok(),
                derivative_adjoint(&eps, spacing, axis, scheme).is_ok()
            );
        }
    }
    assert!(matches!(
        derivative_adjoint(&eps, spacing, Axis::Y, DifferenceScheme::Central),
        Err(FdmError::GridTooSmall {
            axis: Axis::Y,
            extent: 2,
            required: 3
        })
    ));
}

fn field_pair(min_extent: usize) -> impl Strategy<Value = (VoxelField<f64>, VoxelField<f64>)> {
    [min_extent..6usize, min_extent..6usize, min_extent..6usize, 1..4usize].prop_flat_map(|[nx, ny, nz, channels]| {
        let shape = [nx, ny, nz];
        (
            voxel_field(channels, shape, -1.0..1.0),
            voxel_field(channels, shape, -1.0..1.0),
        )
    })
}

proptest! {
    #[test]
    fn forward_derivative_adjoint_identity((x, y) in field_pair(2), h in vec(0.1..2.0f64, 3)) {
        let spacing = [h[0], h[1], h[2]];
        for axis in Axis::ALL {
            let dx = derivative(&x, spacing, axis, DifferenceScheme::Forward).unwrap();
            let dty = derivative_adjoint(&y, spacing, axis, DifferenceScheme::Forward).unwrap();
            let lhs = dx.dot(&y).unwrap();
            let rhs = x.dot(&dty).unwrap();
            assert_scalar_eq!(lhs, rhs, comp = abs, tol = 1e-9);
        }
    }

    #[test]
    fn central_derivative_adjoint_identity((x, y) in field_pair(3), h in vec(0.1..2.0f64, 3)) {
        let spacing = [h[0], h[1], h[2]];
        for axis in Axis::ALL {
            let dx = derivative(&x, spacing, axis, DifferenceScheme::Central).unwrap();
            let dty = derivative_adjoint(&y, spacing, axis, DifferenceScheme::Central).unwrap();
            let lhs = dx.dot(&y).unwrap();
            let rhs = x.dot(&dty).unwrap();
            assert_scalar_eq!(lhs, rhs, comp = abs, tol = 1e-9);
        }
    }
}
