//! Small utilities for `nalgebra-sparse` matrices.
use nalgebra_sparse::{CooMatrix, CscMatrix};
use voxfdm_traits::Real;

/// Build the square diagonal matrix with the given diagonal.
///
/// Zero entries on the diagonal are not stored.
pub fn diagonal_matrix<T: Real>(diagonal: &[T]) -> CscMatrix<T> {
    let n = diagonal.len();
    let mut coo = CooMatrix::new(n, n);
    for (i, d_i) in diagonal.iter().enumerate() {
        if *d_i != T::zero() {
            coo.push(i, i, *d_i);
        }
    }
    CscMatrix::from(&coo)
}

/// Scales row `i` of the matrix by `weights[i]`, i.e. computes $D A$ with $D = \operatorname{diag}(w)$.
///
/// The sparsity pattern is left untouched.
///
/// # Panics
///
/// Panics if the number of weights does not match the number of rows.
pub fn scale_rows<T: Real>(matrix: &mut CscMatrix<T>, weights: &[T]) {
    assert_eq!(
        matrix.nrows(),
        weights.len(),
        "Number of weights must match number of rows."
    );
    for mut col in matrix.col_iter_mut() {
        let (rows, values) = col.rows_and_values_mut();
        for (i, v) in rows.iter().zip(values.iter_mut()) {
            *v *= weights[*i];
        }
    }
}

/// The largest absolute entry of $A - A^T$.
///
/// # Panics
///
/// Panics if the matrix is not square.
pub fn symmetry_defect<T: Real>(matrix: &CscMatrix<T>) -> T {
    assert_eq!(matrix.nrows(), matrix.ncols(), "Matrix must be square.");
    let transpose = matrix.transpose();
    let difference = matrix - &transpose;
    difference
        .values()
        .iter()
        .fold(T::zero(), |max, v| max.max(v.abs()))
}
