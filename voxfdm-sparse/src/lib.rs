//! Sparse linear algebra functionality for `voxfdm`.
//!
//! Assembly is done with `nalgebra-sparse` matrices; this crate adds the direct solvers and the
//! handful of matrix utilities that the finite difference solver needs on top of that.
pub mod direct;
pub mod sparse;

pub use direct::{DirectSolver, Factorization, SolveError, SolverHandle, SolverKind};

pub extern crate nalgebra_sparse;
