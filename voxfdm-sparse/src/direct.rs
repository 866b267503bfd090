//! Direct solvers for sparse linear systems.
//!
//! A [`DirectSolver`] is a small, copyable description of *how* a system should be solved. Calling
//! [`DirectSolver::prepare`] on a matrix produces a [`SolverHandle`], which either holds a
//! factorization that can be reused for any number of right-hand sides (including transposed
//! solves), or simply remembers the solver kind and factors the matrix anew on every solve.
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Dyn, LU};
use nalgebra_sparse::factorization::{CholeskyError, CscCholesky};
use nalgebra_sparse::CscMatrix;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::time::Instant;
use voxfdm_traits::Real;

/// Dense LU is only meant for small systems. Above this size we still do as asked, but complain.
const DENSE_LU_SIZE_WARNING: usize = 20_000;

/// The factorization backend used by a [`DirectSolver`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverKind {
    /// Sparse Cholesky factorization $A = L L^T$.
    ///
    /// Requires a symmetric positive definite matrix. Since $A^T = A$, transposed solves reuse
    /// the factorization as-is.
    #[default]
    Cholesky,
    /// Dense LU factorization with partial pivoting, $P A = L U$.
    ///
    /// Works for general non-singular matrices, but stores the matrix densely.
    DenseLu,
}

#[derive(Debug)]
pub enum SolveError {
    /// Cholesky factorization failed because the matrix is not positive definite.
    NotPositiveDefinite(CholeskyError),
    /// The matrix is singular (to working precision).
    Singular,
    /// The matrix is not square, or the right-hand side does not match the matrix.
    DimensionMismatch { expected: usize, actual: usize },
}

impl Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::NotPositiveDefinite(err) => {
                write!(f, "Cholesky factorization failed, matrix is not positive definite: {}", err)
            }
            SolveError::Singular => write!(f, "Matrix is singular"),
            SolveError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

impl Error for SolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SolveError::NotPositiveDefinite(err) => Some(err),
            _ => None,
        }
    }
}

/// Configuration of a direct linear solver.
///
/// With `factorize` enabled, [`prepare`](Self::prepare) computes the factorization once so that
/// repeated solves (e.g. a forward solve followed by an adjoint solve) share it. Otherwise every
/// solve performs a full direct solve from scratch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectSolver {
    pub kind: SolverKind,
    pub factorize: bool,
}

impl Default for DirectSolver {
    fn default() -> Self {
        Self {
            kind: SolverKind::Cholesky,
            factorize: true,
        }
    }
}

impl DirectSolver {
    pub fn new(kind: SolverKind) -> Self {
        Self { kind, factorize: true }
    }

    pub fn with_factorization(self, factorize: bool) -> Self {
        Self { factorize, ..self }
    }

    /// Prepare a handle for solving systems with the given matrix.
    pub fn prepare<T: Real>(&self, matrix: &CscMatrix<T>) -> Result<SolverHandle<T>, SolveError> {
        check_square(matrix)?;
        if self.factorize {
            Factorization::factor(self.kind, matrix).map(SolverHandle::Factorized)
        } else {
            Ok(SolverHandle::Unfactorized(self.kind))
        }
    }

    /// Solve $A x = b$ once.
    pub fn solve<T: Real>(&self, matrix: &CscMatrix<T>, rhs: &DVector<T>) -> Result<DVector<T>, SolveError> {
        self.prepare(matrix)?.solve(matrix, rhs)
    }
}

/// A factorized matrix.
pub enum Factorization<T: Real> {
    Cholesky(CscCholesky<T>),
    DenseLu(LU<T, Dyn, Dyn>),
}

impl<T: Real> Debug for Factorization<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factorization::Cholesky(_) => write!(f, "Factorization::Cholesky"),
            Factorization::DenseLu(_) => write!(f, "Factorization::DenseLu"),
        }
    }
}

impl<T: Real> Factorization<T> {
    pub fn factor(kind: SolverKind, matrix: &CscMatrix<T>) -> Result<Self, SolveError> {
        check_square(matrix)?;
        let n = matrix.nrows();
        let timer = Instant::now();
        let factorization = match kind {
            SolverKind::Cholesky => {
                let cholesky = CscCholesky::factor(matrix).map_err(SolveError::NotPositiveDefinite)?;
                Factorization::Cholesky(cholesky)
            }
            SolverKind::DenseLu => {
                if n > DENSE_LU_SIZE_WARNING {
                    warn!(
                        "Dense LU requested for a {n}x{n} system. Consider the sparse Cholesky solver instead."
                    );
                }
                let lu = DMatrix::from(matrix).lu();
                if !lu.is_invertible() {
                    return Err(SolveError::Singular);
                }
                Factorization::DenseLu(lu)
            }
        };
        debug!(
            "Factored {n}x{n} matrix ({} non-zeros) with {:?} in {:.3?}",
            matrix.nnz(),
            kind,
            timer.elapsed()
        );
        Ok(factorization)
    }

    pub fn kind(&self) -> SolverKind {
        match self {
            Factorization::Cholesky(_) => SolverKind::Cholesky,
            Factorization::DenseLu(_) => SolverKind::DenseLu,
        }
    }

    fn dim(&self) -> usize {
        match self {
            Factorization::Cholesky(cholesky) => cholesky.l().nrows(),
            Factorization::DenseLu(lu) => lu.u().nrows(),
        }
    }

    /// Solve $A x = b$.
    pub fn solve(&self, rhs: &DVector<T>) -> Result<DVector<T>, SolveError> {
        check_rhs(self.dim(), rhs)?;
        match self {
            Factorization::Cholesky(cholesky) => {
                // CscCholesky only solves with dense matrices, so we take the single column
                let x = cholesky.solve(rhs);
                Ok(x.column(0).into_owned())
            }
            Factorization::DenseLu(lu) => lu.solve(rhs).ok_or(SolveError::Singular),
        }
    }

    /// Solve $A^T y = b$ with the same factorization.
    pub fn solve_transpose(&self, rhs: &DVector<T>) -> Result<DVector<T>, SolveError> {
        check_rhs(self.dim(), rhs)?;
        match self {
            // Cholesky factors are only valid for symmetric matrices
            Factorization::Cholesky(_) => self.solve(rhs),
            Factorization::DenseLu(lu) => {
                // P A = L U  =>  A^T = U^T L^T P
                let z = lu
                    .u()
                    .tr_solve_upper_triangular(rhs)
                    .ok_or(SolveError::Singular)?;
                let mut y = lu
                    .l()
                    .tr_solve_lower_triangular(&z)
                    .ok_or(SolveError::Singular)?;
                lu.p().inv_permute_rows(&mut y);
                Ok(y)
            }
        }
    }
}

/// Handle returned by [`DirectSolver::prepare`].
#[derive(Debug)]
pub enum SolverHandle<T: Real> {
    /// A reusable factorization of the matrix.
    Factorized(Factorization<T>),
    /// No factorization is stored: every solve factors the matrix again.
    Unfactorized(SolverKind),
}

impl<T: Real> SolverHandle<T> {
    pub fn is_factorized(&self) -> bool {
        matches!(self, SolverHandle::Factorized(_))
    }

    /// Solve $A x = b$.
    ///
    /// The matrix must be the one the handle was prepared with. It is only accessed
    /// by unfactorized handles.
    pub fn solve(&self, matrix: &CscMatrix<T>, rhs: &DVector<T>) -> Result<DVector<T>, SolveError> {
        match self {
            SolverHandle::Factorized(factorization) => factorization.solve(rhs),
            SolverHandle::Unfactorized(kind) => Factorization::factor(*kind, matrix)?.solve(rhs),
        }
    }

    /// Solve $A^T y = b$.
    pub fn solve_transpose(&self, matrix: &CscMatrix<T>, rhs: &DVector<T>) -> Result<DVector<T>, SolveError> {
        match self {
            SolverHandle::Factorized(factorization) => factorization.solve_transpose(rhs),
            SolverHandle::Unfactorized(kind) => Factorization::factor(*kind, matrix)?.solve_transpose(rhs),
        }
    }
}

fn check_square<T>(matrix: &CscMatrix<T>) -> Result<(), SolveError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(SolveError::DimensionMismatch {
            expected: matrix.nrows(),
            actual: matrix.ncols(),
        });
    }
    Ok(())
}

fn check_rhs<T: Real>(dim: usize, rhs: &DVector<T>) -> Result<(), SolveError> {
    if rhs.len() != dim {
        return Err(SolveError::DimensionMismatch {
            expected: dim,
            actual: rhs.len(),
        });
    }
    Ok(())
}
