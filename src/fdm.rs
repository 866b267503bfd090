//! The finite difference solver for linear elasticity with optional padding.
//!
//! [`FdmSolver`] owns a snapshot of the problem it was assembled for, together with the
//! density-independent matrices. Every solve clamps the density to `[theta_min, 1]`, assembles the
//! system matrix, solves it with a direct solver and computes stresses. With a non-zero padding
//! depth the domain is surrounded by void voxels before solving, which moves the one-sided
//! stencils at the boundary away from the physical domain. All outputs are returned at the
//! physical grid shape, except for [`FdmSolver::solve_padded`].
use crate::adjoint::{AdjointLinearSolver, ForwardState};
use crate::elasticity::{ElasticityMatrices, ElasticityOperator, SimpInterpolation};
use crate::error::FdmError;
use crate::grid::{DirichletMask, VoxelField, VoxelGrid};
use crate::problem::{ElasticityProblem, Solution, SolverOutput};
use crate::stencil::DifferenceScheme;
use crate::stress::von_mises_stress;
use crate::Real;
use log::{debug, info, warn};
use nalgebra::Scalar;
use nalgebra_sparse::CscMatrix;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use voxfdm_sparse::DirectSolver;

/// Configuration of an [`FdmSolver`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct FdmSettings<T> {
    /// Smallest relative stiffness. Must be positive to keep the system matrix non-singular.
    pub theta_min: T,
    pub scheme: DifferenceScheme,
    /// Number of void voxels added on each side of every axis. Zero disables padding.
    pub padding_depth: usize,
    pub solver: DirectSolver,
    /// Whether [`FdmSolver::attach`] assembles the problem matrices right away.
    pub assemble_on_attach: bool,
}

impl<T: Real> Default for FdmSettings<T> {
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn default() -> Self {
        Self {
            theta_min: 1e-6,
            scheme: DifferenceScheme::default(),
            padding_depth: 2,
            solver: DirectSolver::default(),
            assemble_on_attach: true,
        }
    }
}

impl<T: Real> FdmSettings<T> {
    pub fn with_theta_min(self, theta_min: T) -> Self {
        Self { theta_min, ..self }
    }

    pub fn with_scheme(self, scheme: DifferenceScheme) -> Self {
        Self { scheme, ..self }
    }

    pub fn with_padding_depth(self, padding_depth: usize) -> Self {
        Self { padding_depth, ..self }
    }

    pub fn with_solver(self, solver: DirectSolver) -> Self {
        Self { solver, ..self }
    }

    pub fn with_assemble_on_attach(self, assemble_on_attach: bool) -> Self {
        Self {
            assemble_on_attach,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), FdmError> {
        if !(self.theta_min > T::zero() && self.theta_min < T::one()) {
            return Err(FdmError::InvalidParameter {
                parameter: "theta_min",
                message: format!("must lie in (0, 1), got {:?}", self.theta_min),
            });
        }
        Ok(())
    }
}

/// Zero-padding of grids and fields by a fixed depth.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Padding {
    depth: usize,
}

impl Padding {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn padded_shape(&self, shape: [usize; 3]) -> [usize; 3] {
        shape.map(|n| n + 2 * self.depth)
    }

    pub fn pad_grid<T: Real>(&self, grid: &VoxelGrid<T>) -> VoxelGrid<T> {
        grid.padded(self.depth)
    }

    /// Pads with the "empty" value: zero load, zero density, free degrees of freedom.
    pub fn pad<T: Real>(&self, field: &VoxelField<T>) -> VoxelField<T> {
        field.padded(self.depth, T::zero())
    }

    pub fn pad_mask(&self, mask: &DirichletMask) -> DirichletMask {
        mask.padded(self.depth, false)
    }

    pub fn strip<T: Scalar>(&self, field: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        field.unpadded(self.depth)
    }
}

/// Identifies assemblies across all solvers, including clones.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Problem data on the padded grid and the density-independent matrices.
#[derive(Debug, Clone)]
struct Assembly<T: Real> {
    grid: VoxelGrid<T>,
    dirichlet: DirichletMask,
    load: VoxelField<T>,
    matrices: ElasticityMatrices<T>,
    generation: u64,
}

/// Records a forward solve so that the gradient with respect to the density can be computed
/// later with [`FdmSolver::density_gradient`].
#[derive(Debug)]
pub struct DensityGradient<T: Real> {
    state: ForwardState<T>,
    clamp_indicator: VoxelField<T>,
    exponent: T,
    generation: u64,
    padded_input: bool,
}

impl<T: Real> DensityGradient<T> {
    pub fn exponent(&self) -> T {
        self.exponent
    }

    pub fn forward_state(&self) -> &ForwardState<T> {
        &self.state
    }
}

/// A differentiable FDM solver for linear elasticity.
///
/// The solver is assembled for one problem at a time. Presenting a different problem to any of
/// the solve methods re-assembles, after which gradient tapes of the previous problem are stale.
///
/// Cloning copies the attached problem and its assembled matrices, so the clone can solve right
/// away. Tapes recorded before cloning stay valid for both solvers until either re-assembles.
#[derive(Debug, Clone)]
pub struct FdmSolver<T: Real> {
    settings: FdmSettings<T>,
    padding: Padding,
    problem: Option<ElasticityProblem<T>>,
    assembly: Option<Assembly<T>>,
}

impl<T: Real> FdmSolver<T> {
    pub fn new(settings: FdmSettings<T>) -> Result<Self, FdmError> {
        settings.validate()?;
        if settings.scheme == DifferenceScheme::Central && settings.padding_depth > 0 {
            warn!(
                "Central differences with padding depth {} leave odd-even modes of the domain \
                 restrained only by the void stiffness",
                settings.padding_depth
            );
        }
        Ok(Self {
            settings,
            padding: Padding::new(settings.padding_depth),
            problem: None,
            assembly: None,
        })
    }

    pub fn settings(&self) -> &FdmSettings<T> {
        &self.settings
    }

    pub fn padding(&self) -> &Padding {
        &self.padding
    }

    /// The problem the solver is attached to, if any.
    pub fn problem(&self) -> Option<&ElasticityProblem<T>> {
        self.problem.as_ref()
    }

    pub fn is_assembled(&self) -> bool {
        self.assembly.is_some()
    }

    /// Attaches a copy of the problem, dropping any previous assembly.
    ///
    /// Assembles immediately if [`FdmSettings::assemble_on_attach`] is set.
    pub fn attach(&mut self, problem: &ElasticityProblem<T>) -> Result<(), FdmError> {
        self.problem = Some(problem.clone());
        self.assembly = None;
        if self.settings.assemble_on_attach {
            self.assemble(problem)?;
        }
        Ok(())
    }

    /// Attaches the problem and (re-)builds all density-independent matrices.
    pub fn assemble(&mut self, problem: &ElasticityProblem<T>) -> Result<(), FdmError> {
        self.problem = Some(problem.clone());
        self.assembly = None;
        let assembly = self.build_assembly(problem)?;
        self.assembly = Some(assembly);
        Ok(())
    }

    fn build_assembly(&self, problem: &ElasticityProblem<T>) -> Result<Assembly<T>, FdmError> {
        let timer = Instant::now();
        let grid = self.padding.pad_grid(problem.grid());
        let dirichlet = self.padding.pad_mask(problem.dirichlet());
        let load = self.padding.pad(&problem.normalized_load()?);

        let operator = ElasticityOperator::new(
            &grid,
            problem.material().poisson,
            self.settings.scheme,
            &dirichlet,
            SimpInterpolation::new(self.settings.theta_min, T::one()),
        )?;
        let matrices = ElasticityMatrices::assemble(&operator)?;

        info!(
            "Assembled FDM problem on {:?} grid (padded to {:?}) in {:.3?}",
            problem.shape(),
            grid.shape(),
            timer.elapsed()
        );
        Ok(Assembly {
            grid,
            dirichlet,
            load,
            matrices,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Returns the assembly for the problem, re-assembling if the solver is attached to a
    /// different problem or not assembled yet.
    fn assembly_for(&mut self, problem: &ElasticityProblem<T>) -> Result<&Assembly<T>, FdmError> {
        if self.problem.as_ref() != Some(problem) {
            self.problem = Some(problem.clone());
            self.assembly = None;
        }
        let assembly = match self.assembly.take() {
            Some(assembly) => assembly,
            None => self.build_assembly(problem)?,
        };
        Ok(self.assembly.insert(assembly))
    }

    /// Pads the density if necessary and validates its shape.
    ///
    /// Returns the padded density and whether it was already given at the padded shape.
    fn padded_density(
        &self,
        problem: &ElasticityProblem<T>,
        density: &VoxelField<T>,
    ) -> Result<(VoxelField<T>, bool), FdmError> {
        let shape = problem.shape();
        let padded_shape = self.padding.padded_shape(shape);
        if density.channels() == 1 && density.shape() == shape {
            Ok((self.padding.pad(density), false))
        } else if density.channels() == 1 && density.shape() == padded_shape {
            Ok((density.clone(), true))
        } else {
            Err(FdmError::shape_mismatch(format!(
                "density has {} channels on shape {:?}, expected 1 channel on shape {:?} or padded shape {:?}",
                density.channels(),
                density.shape(),
                shape,
                padded_shape
            )))
        }
    }

    /// Assembles the system matrix $A(\theta)$ on the padded grid.
    ///
    /// The density is clamped to `[theta_min, 1]` first.
    pub fn system_matrix(
        &mut self,
        problem: &ElasticityProblem<T>,
        density: &VoxelField<T>,
        exponent: T,
    ) -> Result<CscMatrix<T>, FdmError> {
        let (padded, _) = self.padded_density(problem, density)?;
        let clamped = self.clamp(&padded);
        let simp = SimpInterpolation::new(self.settings.theta_min, exponent);
        self.assembly_for(problem)?.matrices.system_matrix(&clamped, &simp)
    }

    fn clamp(&self, density: &VoxelField<T>) -> VoxelField<T> {
        let theta_min = self.settings.theta_min;
        if let (Some(min), Some(max)) = (density.min_value(), density.max_value()) {
            if min < T::zero() || max > T::one() {
                warn!(
                    "Density values in [{:?}, {:?}] lie outside [0, 1] and are clamped",
                    min, max
                );
            }
        }
        density.map(|theta| theta.max(theta_min).min(T::one()))
    }

    fn clamp_indicator(&self, density: &VoxelField<T>) -> VoxelField<T> {
        let theta_min = self.settings.theta_min;
        density.map(|theta| {
            if theta >= theta_min && theta <= T::one() {
                T::one()
            } else {
                T::zero()
            }
        })
    }

    /// Solves on the padded grid. The outputs are not stripped.
    fn forward(
        &mut self,
        problem: &ElasticityProblem<T>,
        density: &VoxelField<T>,
        exponent: T,
    ) -> Result<(SolverOutput<T>, DensityGradient<T>), FdmError> {
        let (padded, padded_input) = self.padded_density(problem, density)?;
        let clamped = self.clamp(&padded);
        let clamp_indicator = self.clamp_indicator(&padded);
        let simp = SimpInterpolation::new(self.settings.theta_min, exponent);
        let linear_solver = AdjointLinearSolver::new(self.settings.solver);
        let young = problem.material().young;
        let poisson = problem.material().poisson;
        let scheme = self.settings.scheme;

        let assembly = self.assembly_for(problem)?;
        let operator = ElasticityOperator::new(&assembly.grid, poisson, scheme, &assembly.dirichlet, simp)?;
        let matrix = assembly.matrices.system_matrix(&clamped, &simp)?;
        let (displacement, state) = linear_solver.forward(&clamped, &assembly.load, matrix)?;
        let stress = operator.stress(&displacement, &clamped, young)?;
        let von_mises = von_mises_stress(&stress)?;

        let output = SolverOutput {
            displacement,
            stress,
            von_mises,
        };
        let tape = DensityGradient {
            state,
            clamp_indicator,
            exponent,
            generation: assembly.generation,
            padded_input,
        };
        Ok((output, tape))
    }

    fn strip_output(&self, output: SolverOutput<T>) -> Result<SolverOutput<T>, FdmError> {
        Ok(SolverOutput {
            displacement: self.padding.strip(&output.displacement)?,
            stress: self.padding.strip(&output.stress)?,
            von_mises: self.padding.strip(&output.von_mises)?,
        })
    }

    /// Solves for the density of the solution, optionally binarized, with SIMP exponent `exponent`.
    ///
    /// Results are memoized on the solution: if its cache already holds an output for the same
    /// variant and exponent, that output is returned without solving.
    pub fn solve(
        &mut self,
        solution: &mut Solution<T>,
        exponent: T,
        binary: bool,
    ) -> Result<SolverOutput<T>, FdmError> {
        if let Some(output) = solution.cache().get(binary, exponent) {
            debug!("Using cached FDM solution (binary: {})", binary);
            return Ok(output.clone());
        }
        let density = solution.density_variant(binary);
        let (output, _) = self.forward(solution.problem(), &density, exponent)?;
        let output = self.strip_output(output)?;
        solution.cache_mut().insert(binary, exponent, output.clone());
        Ok(output)
    }

    /// Like [`solve`](Self::solve), but returns the outputs on the padded grid, including the
    /// void voxels around the domain.
    ///
    /// The solution cache holds physical outputs only, so this always solves and leaves the cache
    /// untouched.
    pub fn solve_padded(
        &mut self,
        solution: &Solution<T>,
        exponent: T,
        binary: bool,
    ) -> Result<SolverOutput<T>, FdmError> {
        let density = solution.density_variant(binary);
        let (output, _) = self.forward(solution.problem(), &density, exponent)?;
        Ok(output)
    }

    /// Solves for the given density and records what is needed for
    /// [`density_gradient`](Self::density_gradient).
    ///
    /// The density may be given at the physical or at the padded grid shape. It is not cached.
    pub fn solve_with_gradient(
        &mut self,
        problem: &ElasticityProblem<T>,
        density: &VoxelField<T>,
        exponent: T,
    ) -> Result<(SolverOutput<T>, DensityGradient<T>), FdmError> {
        let (output, tape) = self.forward(problem, density, exponent)?;
        Ok((self.strip_output(output)?, tape))
    }

    /// The gradient of a loss with respect to the density passed to
    /// [`solve_with_gradient`](Self::solve_with_gradient), given the gradient of the loss with
    /// respect to the (physical) displacement.
    ///
    /// Voxels whose density was clamped receive zero gradient. The result has the shape the
    /// density was given in.
    pub fn density_gradient(
        &self,
        tape: DensityGradient<T>,
        grad_displacement: &VoxelField<T>,
    ) -> Result<VoxelField<T>, FdmError> {
        let assembly = self
            .assembly
            .as_ref()
            .filter(|assembly| assembly.generation == tape.generation)
            .ok_or(FdmError::StaleGradientTape)?;
        let problem = self.problem.as_ref().ok_or(FdmError::StaleGradientTape)?;
        grad_displacement.check_layout(3, problem.shape(), "displacement gradient")?;

        let simp = SimpInterpolation::new(self.settings.theta_min, tape.exponent);
        let operator = ElasticityOperator::new(
            &assembly.grid,
            problem.material().poisson,
            self.settings.scheme,
            &assembly.dirichlet,
            simp,
        )?;
        let linear_solver = AdjointLinearSolver::new(self.settings.solver);
        let grad_padded = self.padding.pad(grad_displacement);
        let mut gradient = linear_solver.backward(&operator, tape.state, &grad_padded)?;
        for (g, indicator) in gradient
            .as_mut_slice()
            .iter_mut()
            .zip(tape.clamp_indicator.as_slice())
        {
            *g *= *indicator;
        }

        if tape.padded_input {
            Ok(gradient)
        } else {
            self.padding.strip(&gradient)
        }
    }
}
