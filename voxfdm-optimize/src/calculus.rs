use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use numeric_literals::replace_float_literals;
use voxfdm_traits::Real;

/// Approximates the derivative of the function `f: R^n -> R` with central finite differences.
///
/// The parameter `h` determines the step size of the finite difference approximation.
///
/// The vector `x` is mutable in order to contain intermediate computations, but upon returning,
/// its content remains unchanged.
pub fn approximate_gradient_fd<'a, T>(
    f: impl FnMut(DVectorView<T>) -> T,
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DVector<T>
where
    T: Real,
{
    let x = x.into();
    let mut df = DVector::zeros(x.len());
    approximate_gradient_fd_into_(DVectorViewMut::from(&mut df), f, x, h);
    df
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn approximate_gradient_fd_into_<T>(
    mut df: DVectorViewMut<T>,
    mut f: impl FnMut(DVectorView<T>) -> T,
    mut x: DVectorViewMut<T>,
    h: T,
) where
    T: Real,
{
    assert_eq!(df.len(), x.len());
    let n = x.len();
    for i in 0..n {
        let x_i = x[i];
        x[i] = x_i + h;
        let f_plus = f(DVectorView::from(&x));
        x[i] = x_i - h;
        let f_minus = f(DVectorView::from(&x));
        df[i] = (f_plus - f_minus) / (2.0 * h);
        x[i] = x_i;
    }
}

/// Approximates the directional derivative $\nabla f(x) \cdot d$ of `f: R^n -> R` with a single
/// central difference.
///
/// This only costs two evaluations of `f`, which is useful when `f` is expensive, e.g. when it
/// involves solving a linear system.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn approximate_directional_derivative_fd<T>(
    mut f: impl FnMut(DVectorView<T>) -> T,
    x: &DVector<T>,
    direction: &DVector<T>,
    h: T,
) -> T
where
    T: Real,
{
    assert_eq!(x.len(), direction.len());
    let x_plus = x + direction * h;
    let x_minus = x - direction * h;
    let f_plus = f(DVectorView::from(&x_plus));
    let f_minus = f(DVectorView::from(&x_minus));
    (f_plus - f_minus) / (2.0 * h)
}

/// Approximates the Jacobian of the function $f: \mathbb{R}^n \rightarrow \mathbb{R}^m$
/// with finite differences.
///
/// The Jacobian matrix is the $m \times n$ matrix whose entries are given by
/// $$ J_{ij} := \pd{f_i}{x_j}.$$
///
/// For a linear map the approximation reproduces the matrix of the map up to round-off,
/// regardless of `h`.
pub fn approximate_jacobian_fd<'a, T>(
    m: usize,
    f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DMatrix<T>
where
    T: Real,
{
    let x = x.into();
    let n = x.len();
    let mut jacobian = DMatrix::zeros(m, n);
    approximate_jacobian_fd_into_(DMatrixViewMut::from(&mut jacobian), f, x, h);
    jacobian
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn approximate_jacobian_fd_into_<T>(
    mut j: DMatrixViewMut<T>,
    mut f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    mut x: DVectorViewMut<T>,
    h: T,
) where
    T: Real,
{
    let m = j.nrows();
    let n = x.len();
    assert_eq!(n, j.ncols());

    // Buffers to hold f(x + e_i h) and f(x - e_i h)
    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    for i in 0..n {
        // df_dxi ~ (f(x + h e_i) - f(x - h e_i)) / (2 h)
        let xi = x[i];
        x[i] = xi + h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_plus));
        x[i] = xi - h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_minus));
        x[i] = xi;

        let mut df_dxi = j.column_mut(i);
        df_dxi.copy_from(&f_plus);
        df_dxi -= &f_minus;
        df_dxi /= 2.0 * h;
    }
}
