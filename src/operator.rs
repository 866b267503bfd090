//! Linear operators acting on voxel fields.
use crate::dirichlet::{ZeroDirichletColumns, ZeroDirichletRows};
use crate::error::FdmError;
use crate::grid::{DirichletMask, VoxelField};
use crate::Real;
use std::fmt;
use std::fmt::Debug;

/// A linear map from fields with `input_channels` channels to fields with `output_channels`
/// channels on the same grid.
///
/// Operators are small, stateless objects with a single entry point, [`apply`](Self::apply).
/// They are composed explicitly with [`then`](Self::then) and decorated with Dirichlet boundary
/// conditions through [`with_dirichlet_columns`](Self::with_dirichlet_columns) and
/// [`with_dirichlet_rows`](Self::with_dirichlet_rows).
pub trait FieldOperator<T: Real> {
    fn input_channels(&self) -> usize;

    fn output_channels(&self) -> usize;

    fn apply(&self, u: &VoxelField<T>) -> Result<VoxelField<T>, FdmError>;

    /// The composition `next ∘ self`.
    fn then<Next>(self, next: Next) -> Chain<Self, Next>
    where
        Self: Sized,
        Next: FieldOperator<T>,
    {
        Chain { first: self, second: next }
    }

    /// Zero the masked entries of the input before applying the operator.
    fn with_dirichlet_columns(self, mask: &DirichletMask) -> ZeroDirichletColumns<'_, Self>
    where
        Self: Sized,
    {
        ZeroDirichletColumns::new(self, mask)
    }

    /// Zero the masked entries of the output after applying the operator.
    fn with_dirichlet_rows(self, mask: &DirichletMask) -> ZeroDirichletRows<'_, Self>
    where
        Self: Sized,
    {
        ZeroDirichletRows::new(self, mask)
    }
}

impl<'a, T, O> FieldOperator<T> for &'a O
where
    T: Real,
    O: FieldOperator<T> + ?Sized,
{
    fn input_channels(&self) -> usize {
        O::input_channels(self)
    }

    fn output_channels(&self) -> usize {
        O::output_channels(self)
    }

    fn apply(&self, u: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        O::apply(self, u)
    }
}

/// Checks that `u` has the number of channels the operator expects.
pub(crate) fn check_input<T: Real>(operator: &impl FieldOperator<T>, u: &VoxelField<T>) -> Result<(), FdmError> {
    if u.channels() != operator.input_channels() {
        return Err(FdmError::shape_mismatch(format!(
            "operator expects {} input channels, got {}",
            operator.input_channels(),
            u.channels()
        )));
    }
    Ok(())
}

/// Composition of two operators, see [`FieldOperator::then`].
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<T, A, B> FieldOperator<T> for Chain<A, B>
where
    T: Real,
    A: FieldOperator<T>,
    B: FieldOperator<T>,
{
    fn input_channels(&self) -> usize {
        self.first.input_channels()
    }

    fn output_channels(&self) -> usize {
        self.second.output_channels()
    }

    fn apply(&self, u: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        if self.first.output_channels() != self.second.input_channels() {
            return Err(FdmError::shape_mismatch(format!(
                "cannot compose an operator with {} output channels with an operator taking {} input channels",
                self.first.output_channels(),
                self.second.input_channels()
            )));
        }
        let intermediate = self.first.apply(u)?;
        self.second.apply(&intermediate)
    }
}

/// Adapts a closure into a [`FieldOperator`].
///
/// The closure is trusted to be linear and to return a field with `output_channels` channels.
pub struct FnOperator<F> {
    input_channels: usize,
    output_channels: usize,
    f: F,
}

impl<F> FnOperator<F> {
    pub fn new(input_channels: usize, output_channels: usize, f: F) -> Self {
        Self {
            input_channels,
            output_channels,
            f,
        }
    }
}

impl<F> Debug for FnOperator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperator")
            .field("input_channels", &self.input_channels)
            .field("output_channels", &self.output_channels)
            .finish_non_exhaustive()
    }
}

impl<T, F> FieldOperator<T> for FnOperator<F>
where
    T: Real,
    F: Fn(&VoxelField<T>) -> Result<VoxelField<T>, FdmError>,
{
    fn input_channels(&self) -> usize {
        self.input_channels
    }

    fn output_channels(&self) -> usize {
        self.output_channels
    }

    fn apply(&self, u: &VoxelField<T>) -> Result<VoxelField<T>, FdmError> {
        check_input(self, u)?;
        (self.f)(u)
    }
}
