//! Dirichlet boundary conditions as operator decorators.
use crate::error::FdmError;
use crate::grid::{DirichletMask, VoxelField};
use crate::operator::FieldOperator;
use crate::stencil::Axis;
use crate::Real;

/// Fixes all three displacement components on the grid slice `index` along `axis`.
pub fn fixed_slice_mask(shape: [usize; 3], axis: Axis, index: usize) -> DirichletMask {
    let d = axis.index();
    VoxelField::from_fn(3, shape, |_, coords| coords[d] == index)
}

/// Number of fixed degrees of freedom.
pub fn count_fixed(mask: &DirichletMask) -> usize {
    mask.as_slice().iter().filter(|&&fixed| fixed).count()
}

/// Zeroes the masked entries of the input before applying the inner operator.
///
/// The masked degrees of freedom therefore do not contribute to the output. The caller's input
/// is left untouched.
#[derive(Debug, Clone)]
pub struct ZeroDirichletColumns<'a, O> {
    operator: O,
    mask: &'a DirichletMask,
}

impl<'a, O> ZeroDirichletColumns<'a, O> {
    pub fn new(operator: O, mask: &'a DirichletMask) -> Self {
        Self { operator, mask }
    }

    pub fn mask(&self) -> &'a DirichletMask {
        self.mask
    }
}

impl<'a, T, O> FieldOperator<T> for ZeroDirichletColumns<'a, O>
where
    T: Real,
    O: FieldOperator<T>,
{
    fn input_channels(&self) -> usize {
        self.operator.input_channels()
    }

    fn output_channels(&self) -> usize {
        self.operator.output_channels()
    }

    fn apply(&self, u: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        let mut masked = u.clone();
        masked.fill_masked(self.mask, T::zero())?;
        self.operator.apply(&masked)
    }
}

/// Applies the inner operator, then zeroes the masked entries of the output.
#[derive(Debug, Clone)]
pub struct ZeroDirichletRows<'a, O> {
    operator: O,
    mask: &'a DirichletMask,
}

impl<'a, O> ZeroDirichletRows<'a, O> {
    pub fn new(operator: O, mask: &'a DirichletMask) -> Self {
        Self { operator, mask }
    }

    pub fn mask(&self) -> &'a DirichletMask {
        self.mask
    }
}

impl<'a, T, O> FieldOperator<T> for ZeroDirichletRows<'a, O>
where
    T: Real,
    O: FieldOperator<T>,
{
    fn input_channels(&self) -> usize {
        self.operator.input_channels()
    }

    fn output_channels(&self) -> usize {
        self.operator.output_channels()
    }

    fn apply(&self, u: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        let mut result = self.operator.apply(u)?;
        result.fill_masked(self.mask, T::zero())?;
        Ok(result)
    }
}
