//! The linear elasticity operator on voxel grids.
//!
//! With the strain operator $J$ (all first derivatives of the displacement, 9 channels), the
//! isotropic constitutive matrix $G$ and the interpolated stiffness $\theta_{\text{eff}}$, the
//! stiffness action is
//! $$
//!   A(u, \theta) = J^T \left( \theta_{\text{eff}} \odot G J u \right),
//! $$
//! where the Dirichlet degrees of freedom are removed from the columns of $J$ and the rows of
//! $J^T$, and mapped to themselves by the identity.
//!
//! Channel `3 * a + c` of the strain holds $\partial_a u_c$, i.e. the derivatives along the x-axis
//! come first.
use crate::assembly::OperatorAssembler;
use crate::error::FdmError;
use crate::grid::{DirichletMask, VoxelField, VoxelGrid};
use crate::operator::{check_input, FieldOperator};
use crate::stencil::{derivative, derivative_adjoint, Axis, DifferenceScheme};
use crate::Real;
use log::debug;
use nalgebra::{SMatrix, SVector};
use nalgebra_sparse::CscMatrix;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use voxfdm_sparse::sparse::{diagonal_matrix, scale_rows};

/// Number of strain (and stress) channels.
pub const STRAIN_CHANNELS: usize = 9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoungPoisson<T> {
    pub young: T,
    pub poisson: T,
}

impl<T: Real> YoungPoisson<T> {
    /// Checks `E > 0` and `-1 < ν < 0.5`.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn validate(&self) -> Result<(), FdmError> {
        if !(self.young > 0.0) {
            return Err(FdmError::InvalidParameter {
                parameter: "young",
                message: format!("Young's modulus must be positive, got {:?}", self.young),
            });
        }
        if !(self.poisson > -1.0 && self.poisson < 0.5) {
            return Err(FdmError::InvalidParameter {
                parameter: "poisson",
                message: format!("Poisson's ratio must lie in (-1, 0.5), got {:?}", self.poisson),
            });
        }
        Ok(())
    }
}

/// The $9 \times 9$ isotropic constitutive matrix for Young's modulus 1 and Poisson's ratio `nu`.
///
/// It maps the displacement gradient $\partial_a u_c$ (channel `3a + c`) to the stress.
/// The shear couplings act on the symmetric part of the gradient only.
#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn constitutive_matrix<T: Real>(nu: T) -> SMatrix<T, 9, 9> {
    let a = 1.0 - nu;
    let s = 0.5 - nu;
    let o = 0.0;
    let g = SMatrix::<T, 9, 9>::from_row_slice(&[
        a,  o,  o,   o,  nu, o,   o,  o,  nu,
        o,  s,  o,   s,  o,  o,   o,  o,  o,
        o,  o,  s,   o,  o,  o,   s,  o,  o,

        o,  s,  o,   s,  o,  o,   o,  o,  o,
        nu, o,  o,   o,  a,  o,   o,  o,  nu,
        o,  o,  o,   o,  o,  s,   o,  s,  o,

        o,  o,  s,   o,  o,  o,   s,  o,  o,
        o,  o,  o,   o,  o,  s,   o,  s,  o,
        nu, o,  o,   o,  nu, o,   o,  o,  a,
    ]);
    g / ((1.0 + nu) * (1.0 - 2.0 * nu))
}

/// SIMP interpolation of the stiffness, $E_{\min} + \theta^p (E - E_{\min})$ with
/// $E_{\min} = \theta_{\min} E$.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimpInterpolation<T> {
    pub theta_min: T,
    pub exponent: T,
}

impl<T: Real> SimpInterpolation<T> {
    pub fn new(theta_min: T, exponent: T) -> Self {
        Self { theta_min, exponent }
    }

    pub fn interpolate(&self, theta: T, young: T) -> T {
        let e_min = self.theta_min * young;
        e_min + theta.powf(self.exponent) * (young - e_min)
    }

    /// Derivative of [`interpolate`](Self::interpolate) with respect to `theta`.
    pub fn derivative(&self, theta: T, young: T) -> T {
        let e_min = self.theta_min * young;
        if self.exponent == T::one() {
            return young - e_min;
        }
        self.exponent * theta.powf(self.exponent - T::one()) * (young - e_min)
    }

    /// The interpolated stiffness for every voxel of a one-channel density field.
    pub fn stiffness(&self, density: &VoxelField<T>, young: T) -> VoxelField<T> {
        density.map(|theta| self.interpolate(theta, young))
    }
}

/// The strain operator $J$: the three displacement components (3 channels) are mapped to their
/// derivatives along x, y and z (9 channels).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StrainOperator<T> {
    spacing: [T; 3],
    scheme: DifferenceScheme,
}

impl<T: Real> StrainOperator<T> {
    pub fn new(spacing: [T; 3], scheme: DifferenceScheme) -> Self {
        Self { spacing, scheme }
    }

    pub fn adjoint(&self) -> StrainAdjointOperator<T> {
        StrainAdjointOperator {
            spacing: self.spacing,
            scheme: self.scheme,
        }
    }
}

impl<T: Real> FieldOperator<T> for StrainOperator<T> {
    fn input_channels(&self) -> usize {
        3
    }

    fn output_channels(&self) -> usize {
        STRAIN_CHANNELS
    }

    fn apply(&self, u: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        check_input(self, u)?;
        let du_dx = derivative(u, self.spacing, Axis::X, self.scheme)?;
        let du_dy = derivative(u, self.spacing, Axis::Y, self.scheme)?;
        let du_dz = derivative(u, self.spacing, Axis::Z, self.scheme)?;
        VoxelField::concat_channels(&[&du_dx, &du_dy, &du_dz])
    }
}

/// The transpose $J^T$ of [`StrainOperator`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StrainAdjointOperator<T> {
    spacing: [T; 3],
    scheme: DifferenceScheme,
}

impl<T: Real> FieldOperator<T> for StrainAdjointOperator<T> {
    fn input_channels(&self) -> usize {
        STRAIN_CHANNELS
    }

    fn output_channels(&self) -> usize {
        3
    }

    fn apply(&self, sigma: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        check_input(self, sigma)?;
        let mut result = VoxelField::zeros(3, sigma.shape());
        for axis in Axis::ALL {
            let block = sigma.channel_range(3 * axis.index(), 3)?;
            let contribution = derivative_adjoint(&block, self.spacing, axis, self.scheme)?;
            *result.as_vector_mut() += contribution.as_vector();
        }
        Ok(result)
    }
}

/// Pointwise application of the constitutive matrix $G$.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConstitutiveOperator<T: Real> {
    matrix: SMatrix<T, 9, 9>,
}

impl<T: Real> ConstitutiveOperator<T> {
    pub fn new(poisson: T) -> Self {
        Self {
            matrix: constitutive_matrix(poisson),
        }
    }

    pub fn matrix(&self) -> &SMatrix<T, 9, 9> {
        &self.matrix
    }

    /// Applies $G^T$ at every voxel.
    pub fn apply_transpose(&self, sigma: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        check_input(self, sigma)?;
        Ok(apply_pointwise(&self.matrix.transpose(), sigma))
    }
}

fn apply_pointwise<T: Real>(matrix: &SMatrix<T, 9, 9>, field: &VoxelField<T>) -> VoxelField<T> {
    let n = field.num_voxels();
    let values = field.as_slice();
    let mut result = field.zeros_like();
    let out = result.as_mut_slice();
    for v in 0..n {
        let local = SVector::<T, 9>::from_fn(|c, _| values[c * n + v]);
        let mapped = matrix * local;
        for c in 0..STRAIN_CHANNELS {
            out[c * n + v] = mapped[c];
        }
    }
    result
}

impl<T: Real> FieldOperator<T> for ConstitutiveOperator<T> {
    fn input_channels(&self) -> usize {
        STRAIN_CHANNELS
    }

    fn output_channels(&self) -> usize {
        STRAIN_CHANNELS
    }

    fn apply(&self, sigma: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        check_input(self, sigma)?;
        Ok(apply_pointwise(&self.matrix, sigma))
    }
}

/// The density-dependent stiffness action $A(u, \theta)$ in operator form, including Dirichlet
/// conditions.
///
/// The stiffness is normalized to Young's modulus 1; the load must be scaled accordingly.
#[derive(Debug, Clone)]
pub struct ElasticityOperator<'a, T: Real> {
    strain: StrainOperator<T>,
    constitutive: ConstitutiveOperator<T>,
    mask: &'a DirichletMask,
    simp: SimpInterpolation<T>,
    shape: [usize; 3],
}

impl<'a, T: Real> ElasticityOperator<'a, T> {
    pub fn new(
        grid: &VoxelGrid<T>,
        poisson: T,
        scheme: DifferenceScheme,
        mask: &'a DirichletMask,
        simp: SimpInterpolation<T>,
    ) -> Result<Self, FdmError> {
        mask.check_layout(3, grid.shape(), "Dirichlet mask")?;
        Ok(Self {
            strain: StrainOperator::new(grid.spacing(), scheme),
            constitutive: ConstitutiveOperator::new(poisson),
            mask,
            simp,
            shape: grid.shape(),
        })
    }

    pub fn strain(&self) -> &StrainOperator<T> {
        &self.strain
    }

    pub fn constitutive(&self) -> &ConstitutiveOperator<T> {
        &self.constitutive
    }

    pub fn mask(&self) -> &'a DirichletMask {
        self.mask
    }

    pub fn simp(&self) -> &SimpInterpolation<T> {
        &self.simp
    }

    fn check_density(&self, density: &VoxelField<T>) -> Result<(), FdmError> {
        density.check_layout(1, self.shape, "density")
    }

    /// $J_D u$, the strain of `u` with the Dirichlet degrees of freedom removed.
    fn masked_strain(&self, u: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        (&self.strain).with_dirichlet_columns(self.mask).apply(u)
    }

    /// $J_D^T \sigma$, the divergence-like transpose with Dirichlet rows zeroed.
    fn masked_strain_adjoint(&self, sigma: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        self.strain.adjoint().with_dirichlet_rows(self.mask).apply(sigma)
    }

    /// Overwrites the Dirichlet degrees of freedom of `result` with those of `input`.
    fn restore_dirichlet(&self, result: &mut VoxelField<T>, input: &VoxelField<T>) {
        for ((r, &x), &fixed) in result
            .as_mut_slice()
            .iter_mut()
            .zip(input.as_slice())
            .zip(self.mask.as_slice())
        {
            if fixed {
                *r = x;
            }
        }
    }

    /// Computes $A(u, \theta)$.
    pub fn apply(&self, u: &VoxelField<T>, density: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        self.check_density(density)?;
        u.check_layout(3, self.shape, "displacement")?;
        let mut sigma = self.constitutive.apply(&self.masked_strain(u)?)?;
        sigma.scale_voxels(&self.simp.stiffness(density, T::one()))?;
        let mut result = self.masked_strain_adjoint(&sigma)?;
        self.restore_dirichlet(&mut result, u);
        Ok(result)
    }

    /// Computes $A(\cdot, \theta)^T y$.
    pub fn apply_adjoint(&self, y: &VoxelField<T>, density: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        self.check_density(density)?;
        y.check_layout(3, self.shape, "adjoint variable")?;
        let mut eps = self.masked_strain(y)?;
        eps.scale_voxels(&self.simp.stiffness(density, T::one()))?;
        let sigma = self.constitutive.apply_transpose(&eps)?;
        let mut result = self.masked_strain_adjoint(&sigma)?;
        self.restore_dirichlet(&mut result, y);
        Ok(result)
    }

    /// The gradient of $y^T A(u, \theta)$ with respect to $\theta$, at fixed `u` and `y`.
    ///
    /// Only the interpolated stiffness depends on the density, so the gradient at voxel $v$ is
    /// the SIMP derivative times $\sum_c (J_D y)_{c,v} (G J_D u)_{c,v}$.
    pub fn density_vjp(
        &self,
        u: &VoxelField<T>,
        y: &VoxelField<T>,
        density: &VoxelField<T>,
    ) -> Result<VoxelField<T>, FdmError> {
        self.check_density(density)?;
        u.check_layout(3, self.shape, "displacement")?;
        y.check_layout(3, self.shape, "adjoint variable")?;
        let eps_y = self.masked_strain(y)?;
        let sigma_u = self.constitutive.apply(&self.masked_strain(u)?)?;

        let n = density.num_voxels();
        let mut gradient = VoxelField::zeros(1, self.shape);
        let (a, b) = (eps_y.as_slice(), sigma_u.as_slice());
        for (v, (g, &theta)) in gradient
            .as_mut_slice()
            .iter_mut()
            .zip(density.as_slice())
            .enumerate()
        {
            let mut contraction = T::zero();
            for c in 0..STRAIN_CHANNELS {
                contraction += a[c * n + v] * b[c * n + v];
            }
            *g = self.simp.derivative(theta, T::one()) * contraction;
        }
        Ok(gradient)
    }

    /// The physical stress $\sigma = \theta_{\text{eff}} \, G J u$ for the given Young's modulus.
    ///
    /// No Dirichlet conditions are applied, so that the stress reflects the actual displacement.
    pub fn stress(&self, u: &VoxelField<T>, density: &VoxelField<T>, young: T) -> Result<VoxelField<T>, FdmError> {
        self.check_density(density)?;
        let mut sigma = self.constitutive.apply(&self.strain.apply(u)?)?;
        sigma.scale_voxels(&self.simp.stiffness(density, young))?;
        Ok(sigma)
    }
}

/// The density-independent matrices of the elasticity operator.
///
/// The system matrix for a given density is
/// $A(\theta) = J_D^T \, \Theta \, (G J_D) + I_D$, where $\Theta$ holds the interpolated
/// stiffness of each voxel repeated for all 9 strain channels, and $I_D$ is the identity on
/// the Dirichlet degrees of freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticityMatrices<T: Real> {
    strain_transpose: CscMatrix<T>,
    constitutive_strain: CscMatrix<T>,
    dirichlet_identity: CscMatrix<T>,
}

impl<T: Real> ElasticityMatrices<T> {
    pub fn assemble(operator: &ElasticityOperator<T>) -> Result<Self, FdmError> {
        let timer = Instant::now();
        let assembler = OperatorAssembler::new(operator.shape);
        let mask = operator.mask;

        let strain = assembler.assemble(&operator.strain.with_dirichlet_columns(mask))?;
        let constitutive_strain = assembler.assemble(
            &operator
                .strain
                .then(operator.constitutive)
                .with_dirichlet_columns(mask),
        )?;
        let identity_diagonal: Vec<T> = mask
            .as_slice()
            .iter()
            .map(|&fixed| if fixed { T::one() } else { T::zero() })
            .collect();

        debug!("Assembled elasticity matrices in {:.3?}", timer.elapsed());
        Ok(Self {
            strain_transpose: strain.transpose(),
            constitutive_strain,
            dirichlet_identity: diagonal_matrix(&identity_diagonal),
        })
    }

    /// $J_D^T$, with shape `3N x 9N`.
    pub fn strain_transpose(&self) -> &CscMatrix<T> {
        &self.strain_transpose
    }

    /// $G J_D$, with shape `9N x 3N`.
    pub fn constitutive_strain(&self) -> &CscMatrix<T> {
        &self.constitutive_strain
    }

    pub fn dirichlet_identity(&self) -> &CscMatrix<T> {
        &self.dirichlet_identity
    }

    /// Assembles $A(\theta)$ for a one-channel density field, normalized to Young's modulus 1.
    pub fn system_matrix(
        &self,
        density: &VoxelField<T>,
        simp: &SimpInterpolation<T>,
    ) -> Result<CscMatrix<T>, FdmError> {
        let n = self.constitutive_strain.ncols() / 3;
        if density.channels() != 1 || density.num_voxels() != n {
            return Err(FdmError::shape_mismatch(format!(
                "density with {} channels on {} voxels does not match a system with {} voxels",
                density.channels(),
                density.num_voxels(),
                n
            )));
        }
        let stiffness = simp.stiffness(density, T::one());
        let weights: Vec<T> = (0..STRAIN_CHANNELS)
            .flat_map(|_| stiffness.as_slice().iter().copied())
            .collect();

        let mut scaled = self.constitutive_strain.clone();
        scale_rows(&mut scaled, &weights);
        let stiffness_matrix = &self.strain_transpose * &scaled;
        Ok(&stiffness_matrix + &self.dirichlet_identity)
    }
}
