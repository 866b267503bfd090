//! Sparse direct solves with a reverse-mode gradient rule for the density.
//!
//! For $A(\theta) u = b$ and a scalar loss $L(u)$, the gradient with respect to $\theta$ is
//! obtained from a single transposed solve $A^T y = \partial L / \partial u$ followed by
//!
//! $$ \frac{dL}{d\theta} = - \frac{\partial}{\partial \theta} \left( y^T A(u, \theta) \right), $$
//!
//! evaluated on the operator form of $A$ at fixed $u$ and $y$. The factorization is never
//! differentiated.
use crate::elasticity::ElasticityOperator;
use crate::error::FdmError;
use crate::grid::VoxelField;
use crate::Real;
use log::debug;
use nalgebra_sparse::CscMatrix;
use std::time::Instant;
use voxfdm_sparse::{DirectSolver, SolverHandle};

/// A linear operator $A(\theta)$ in operator form that can be differentiated with respect to the
/// density $\theta$.
pub trait DensityOperator<T: Real> {
    /// Computes $A(u, \theta)$.
    fn apply(&self, u: &VoxelField<T>, density: &VoxelField<T>) -> Result<VoxelField<T>, FdmError>;

    /// Computes $\partial (y^T A(u, \theta)) / \partial \theta$.
    fn density_vjp(
        &self,
        u: &VoxelField<T>,
        y: &VoxelField<T>,
        density: &VoxelField<T>,
    ) -> Result<VoxelField<T>, FdmError>;
}

impl<'a, T: Real> DensityOperator<T> for ElasticityOperator<'a, T> {
    fn apply(&self, u: &VoxelField<T>, density: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        ElasticityOperator::apply(self, u, density)
    }

    fn density_vjp(
        &self,
        u: &VoxelField<T>,
        y: &VoxelField<T>,
        density: &VoxelField<T>,
    ) -> Result<VoxelField<T>, FdmError> {
        ElasticityOperator::density_vjp(self, u, y, density)
    }
}

/// Everything the backward pass needs from a forward solve.
///
/// Owned exclusively by one forward/backward pair: [`AdjointLinearSolver::backward`] consumes it.
#[derive(Debug)]
pub struct ForwardState<T: Real> {
    density: VoxelField<T>,
    displacement: VoxelField<T>,
    load: VoxelField<T>,
    system_matrix: CscMatrix<T>,
    handle: SolverHandle<T>,
}

impl<T: Real> ForwardState<T> {
    pub fn density(&self) -> &VoxelField<T> {
        &self.density
    }

    pub fn displacement(&self) -> &VoxelField<T> {
        &self.displacement
    }

    pub fn load(&self) -> &VoxelField<T> {
        &self.load
    }

    pub fn system_matrix(&self) -> &CscMatrix<T> {
        &self.system_matrix
    }

    pub fn handle(&self) -> &SolverHandle<T> {
        &self.handle
    }
}

/// Solves $A(\theta) u = b$ and provides the matching gradient rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct AdjointLinearSolver {
    solver: DirectSolver,
}

impl AdjointLinearSolver {
    pub fn new(solver: DirectSolver) -> Self {
        Self { solver }
    }

    pub fn solver(&self) -> &DirectSolver {
        &self.solver
    }

    /// Solves the system and returns the solution together with the state for the backward pass.
    ///
    /// `density` is only stored; it must be the density `system_matrix` was assembled for.
    pub fn forward<T: Real>(
        &self,
        density: &VoxelField<T>,
        load: &VoxelField<T>,
        system_matrix: CscMatrix<T>,
    ) -> Result<(VoxelField<T>, ForwardState<T>), FdmError> {
        let timer = Instant::now();
        let handle = self.solver.prepare(&system_matrix)?;
        let x = handle.solve(&system_matrix, load.as_vector())?;
        let displacement = VoxelField::from_vector(load.channels(), load.shape(), x)?;
        debug!(
            "Forward solve of {} unknowns took {:.3?}",
            system_matrix.nrows(),
            timer.elapsed()
        );

        let state = ForwardState {
            density: density.clone(),
            displacement: displacement.clone(),
            load: load.clone(),
            system_matrix,
            handle,
        };
        Ok((displacement, state))
    }

    /// Computes the gradient of the loss with respect to the density, given the gradient
    /// `grad_output` of the loss with respect to the solution of the forward pass.
    pub fn backward<T: Real>(
        &self,
        operator: &impl DensityOperator<T>,
        state: ForwardState<T>,
        grad_output: &VoxelField<T>,
    ) -> Result<VoxelField<T>, FdmError> {
        let timer = Instant::now();
        let displacement = &state.displacement;
        grad_output.check_layout(displacement.channels(), displacement.shape(), "output gradient")?;

        let y = state
            .handle
            .solve_transpose(&state.system_matrix, grad_output.as_vector())?;
        let y = VoxelField::from_vector(displacement.channels(), displacement.shape(), y)?;
        let vjp = operator.density_vjp(displacement, &y, &state.density)?;
        debug!("Adjoint solve and density gradient took {:.3?}", timer.elapsed());
        Ok(vjp.map(|g| -g))
    }
}
