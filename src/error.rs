//! Error types.
use crate::stencil::Axis;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use voxfdm_sparse::SolveError;

#[derive(Debug)]
pub enum FdmError {
    /// The grid has a zero extent or a non-positive spacing.
    InvalidGrid(String),
    /// The grid is too thin along an axis for the requested difference stencil.
    GridTooSmall { axis: Axis, extent: usize, required: usize },
    /// Two tensors that must agree in shape (or channel count) do not.
    ShapeMismatch { context: String },
    /// A scalar parameter is outside its admissible range.
    InvalidParameter { parameter: &'static str, message: String },
    /// The probing footprint of the operator assembler is too small to separate probes.
    InvalidFootprint(usize),
    /// A density field contains values outside of `[0, 1]`.
    DensityOutOfRange { min: f64, max: f64 },
    /// A gradient tape was used after the solver was re-assembled for another problem.
    StaleGradientTape,
    /// The sparse direct solve failed.
    Solve(SolveError),
}

impl FdmError {
    pub(crate) fn shape_mismatch(context: impl Into<String>) -> Self {
        FdmError::ShapeMismatch {
            context: context.into(),
        }
    }
}

impl Display for FdmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdmError::InvalidGrid(msg) => write!(f, "Invalid grid: {}", msg),
            FdmError::GridTooSmall { axis, extent, required } => write!(
                f,
                "Grid extent {} along axis {:?} is too small, the difference stencil needs at least {} voxels",
                extent, axis, required
            ),
            FdmError::ShapeMismatch { context } => write!(f, "Shape mismatch: {}", context),
            FdmError::InvalidParameter { parameter, message } => {
                write!(f, "Invalid parameter `{}`: {}", parameter, message)
            }
            FdmError::InvalidFootprint(size) => {
                write!(f, "Stencil footprint must be at least 3 to separate probes, got {}", size)
            }
            FdmError::DensityOutOfRange { min, max } => {
                write!(f, "Density must lie in [0, 1], found values in [{}, {}]", min, max)
            }
            FdmError::StaleGradientTape => {
                write!(f, "Gradient tape belongs to a problem that is no longer assembled")
            }
            FdmError::Solve(err) => write!(f, "Linear solve failed: {}", err),
        }
    }
}

impl Error for FdmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FdmError::Solve(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SolveError> for FdmError {
    fn from(err: SolveError) -> Self {
        FdmError::Solve(err)
    }
}
