//! Problem definitions and solutions with cached results.
use crate::elasticity::YoungPoisson;
use crate::error::FdmError;
use crate::grid::{DirichletMask, VoxelField, VoxelGrid};
use crate::Real;
use nalgebra::try_convert;
use numeric_literals::replace_float_literals;

/// Densities at or above this value are treated as solid when binarizing.
pub const BINARIZATION_THRESHOLD: f64 = 0.5;

/// A linear elasticity problem on a voxel grid.
///
/// The Dirichlet mask fixes displacement components to zero. The load is a force per degree of
/// freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticityProblem<T: Real> {
    grid: VoxelGrid<T>,
    dirichlet: DirichletMask,
    load: VoxelField<T>,
    material: YoungPoisson<T>,
}

impl<T: Real> ElasticityProblem<T> {
    pub fn new(
        grid: VoxelGrid<T>,
        dirichlet: DirichletMask,
        load: VoxelField<T>,
        material: YoungPoisson<T>,
    ) -> Result<Self, FdmError> {
        dirichlet.check_layout(3, grid.shape(), "Dirichlet mask")?;
        load.check_layout(3, grid.shape(), "load")?;
        material.validate()?;
        Ok(Self {
            grid,
            dirichlet,
            load,
            material,
        })
    }

    pub fn grid(&self) -> &VoxelGrid<T> {
        &self.grid
    }

    pub fn shape(&self) -> [usize; 3] {
        self.grid.shape()
    }

    pub fn dirichlet(&self) -> &DirichletMask {
        &self.dirichlet
    }

    pub fn load(&self) -> &VoxelField<T> {
        &self.load
    }

    pub fn material(&self) -> &YoungPoisson<T> {
        &self.material
    }

    /// The right-hand side $b$: the load with the Dirichlet entries zeroed, divided by Young's
    /// modulus.
    pub fn normalized_load(&self) -> Result<VoxelField<T>, FdmError> {
        let mut b = self.load.clone();
        b.fill_masked(&self.dirichlet, T::zero())?;
        *b.as_vector_mut() /= self.material.young;
        Ok(b)
    }
}

/// Checks that every density value lies in `[0, 1]`.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn check_density_range<T: Real>(density: &VoxelField<T>) -> Result<(), FdmError> {
    let (min, max) = match (density.min_value(), density.max_value()) {
        (Some(min), Some(max)) => (min, max),
        _ => return Ok(()),
    };
    // Written so that NaN fails the check
    if !(min >= 0.0 && max <= 1.0) {
        return Err(FdmError::DensityOutOfRange {
            min: try_convert(min).unwrap_or(f64::NAN),
            max: try_convert(max).unwrap_or(f64::NAN),
        });
    }
    Ok(())
}

/// Maps densities at or above [`BINARIZATION_THRESHOLD`] to 1 and all others to 0.
pub fn binarize<T: Real>(density: &VoxelField<T>) -> VoxelField<T> {
    let threshold = T::from_f64(BINARIZATION_THRESHOLD).expect("literal must fit in T");
    density.map(|theta| if theta >= threshold { T::one() } else { T::zero() })
}

/// The outputs of a solve, at the physical (unpadded) grid shape unless stated otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput<T: Real> {
    /// Displacement, 3 channels.
    pub displacement: VoxelField<T>,
    /// Stress, 9 channels.
    pub stress: VoxelField<T>,
    /// Von Mises stress, 1 channel.
    pub von_mises: VoxelField<T>,
}

#[derive(Debug, Clone, PartialEq)]
struct CachedOutput<T: Real> {
    exponent: T,
    output: SolverOutput<T>,
}

/// Memoized solver outputs of a [`Solution`], one slot for the density as given and one for its
/// binarization.
///
/// Each slot also records the SIMP exponent it was filled with, so the cache is keyed by
/// `(binary, exponent)` rather than by the variant alone. A lookup with another exponent misses,
/// and the following solve replaces the slot. There is still at most one output per variant.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionCache<T: Real> {
    continuous: Option<CachedOutput<T>>,
    binary: Option<CachedOutput<T>>,
}

impl<T: Real> Default for SolutionCache<T> {
    fn default() -> Self {
        Self {
            continuous: None,
            binary: None,
        }
    }
}

impl<T: Real> SolutionCache<T> {
    fn slot(&self, binary: bool) -> &Option<CachedOutput<T>> {
        if binary {
            &self.binary
        } else {
            &self.continuous
        }
    }

    pub fn get(&self, binary: bool, exponent: T) -> Option<&SolverOutput<T>> {
        self.slot(binary)
            .as_ref()
            .filter(|cached| cached.exponent == exponent)
            .map(|cached| &cached.output)
    }

    pub fn insert(&mut self, binary: bool, exponent: T, output: SolverOutput<T>) {
        let slot = if binary { &mut self.binary } else { &mut self.continuous };
        *slot = Some(CachedOutput { exponent, output });
    }

    pub fn is_empty(&self) -> bool {
        self.continuous.is_none() && self.binary.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A density distribution for a problem, together with cached solver outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution<T: Real> {
    problem: ElasticityProblem<T>,
    density: VoxelField<T>,
    cache: SolutionCache<T>,
}

impl<T: Real> Solution<T> {
    /// Fails if the density is not a one-channel field on the problem grid with values in `[0, 1]`.
    pub fn new(problem: ElasticityProblem<T>, density: VoxelField<T>) -> Result<Self, FdmError> {
        density.check_layout(1, problem.shape(), "density")?;
        check_density_range(&density)?;
        Ok(Self {
            problem,
            density,
            cache: SolutionCache::default(),
        })
    }

    /// A solution with the same density everywhere.
    pub fn uniform(problem: ElasticityProblem<T>, density: T) -> Result<Self, FdmError> {
        let field = VoxelField::from_element(1, problem.shape(), density);
        Self::new(problem, field)
    }

    pub fn problem(&self) -> &ElasticityProblem<T> {
        &self.problem
    }

    pub fn density(&self) -> &VoxelField<T> {
        &self.density
    }

    /// The density, binarized if requested.
    pub fn density_variant(&self, binary: bool) -> VoxelField<T> {
        if binary {
            binarize(&self.density)
        } else {
            self.density.clone()
        }
    }

    /// Replaces the density and invalidates all cached outputs.
    pub fn set_density(&mut self, density: VoxelField<T>) -> Result<(), FdmError> {
        density.check_layout(1, self.problem.shape(), "density")?;
        check_density_range(&density)?;
        self.density = density;
        self.cache.clear();
        Ok(())
    }

    pub fn cache(&self) -> &SolutionCache<T> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SolutionCache<T> {
        &mut self.cache
    }
}
