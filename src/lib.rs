//! A differentiable finite difference solver for linear elasticity on regular voxel grids.
//!
//! The stiffness of every voxel is interpolated from a density field, the resulting sparse system
//! is solved with a direct solver, and gradients of a loss with respect to the density are
//! obtained with the discrete adjoint method.
pub mod adjoint;
pub mod assembly;
pub mod dirichlet;
pub mod elasticity;
pub mod error;
pub mod fdm;
pub mod filter;
pub mod grid;
pub mod operator;
pub mod problem;
pub mod procedural;
pub mod stencil;
pub mod stress;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub mod sparse {
    pub use voxfdm_sparse::*;
}

pub use error::FdmError;
pub use fdm::{DensityGradient, FdmSettings, FdmSolver, Padding};
pub use grid::{DirichletMask, VoxelField, VoxelGrid};
pub use problem::{ElasticityProblem, Solution, SolverOutput};
pub use voxfdm_traits::Real;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
