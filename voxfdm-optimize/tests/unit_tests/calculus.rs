use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use voxfdm_optimize::calculus::*;

#[test]
fn approximate_gradient_fd_cubic_polynomial() {
    // Define some function f and its gradient
    let f = |x: DVectorView<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        3.0 * x * x * x + 3.0 * x * y - 5.0 * z * z + 2.0
    };
    let f_grad = |x: &DVector<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        DVector::from_column_slice(&[9.0 * x * x + 3.0 * y, 3.0 * x, -10.0 * z])
    };

    let mut x = DVector::from_column_slice(&[3.0, 4.0, 5.0]);
    let x_original = x.clone();
    let f_grad_fd = approximate_gradient_fd(f, &mut x, 1e-6);

    // The input is restored after differentiation
    assert_eq!(x, x_original);
    assert_matrix_eq!(f_grad_fd, f_grad(&x), comp = abs, tol = 1e-5);
}

#[test]
fn approximate_directional_derivative_matches_gradient_projection() {
    let f = |x: DVectorView<f64>| x[0] * x[0] * x[1] + x[1].sin();
    let x = DVector::from_column_slice(&[1.5, -0.5]);
    let direction = DVector::from_column_slice(&[0.3, 2.0]);

    let gradient = DVector::from_column_slice(&[2.0 * x[0] * x[1], x[0] * x[0] + x[1].cos()]);
    let expected = gradient.dot(&direction);
    let approx = approximate_directional_derivative_fd(f, &x, &direction, 1e-6);

    assert_scalar_eq!(approx, expected, comp = abs, tol = 1e-6);
}

#[test]
fn approximate_jacobian_fd_reproduces_linear_map() {
    #[rustfmt::skip]
    let a = DMatrix::from_row_slice(2, 3, &[
        1.0, -2.0, 0.5,
        4.0,  0.0, 3.0,
    ]);
    let f = |x: DVectorView<f64>, mut y: DVectorViewMut<f64>| {
        y.copy_from(&(&a * x));
    };

    let mut x = DVector::from_column_slice(&[0.1, 0.2, 0.3]);
    let jacobian = approximate_jacobian_fd(2, f, &mut x, 1e-3);

    assert_matrix_eq!(jacobian, a, comp = abs, tol = 1e-10);
}
