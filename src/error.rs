use thiserror::Error;

use crate::basis::BasisError;
use crate::model::ModelError;
use crate::pricing::PricingError;
use crate::sparse::{CscError, CsrError};
use crate::status::{SolveMode, Status};

/// Top-level error for the solver surface. Normal terminations
/// (infeasible, unbounded, iteration limit) are statuses on the solution,
/// not errors; this type covers argument and numerical failures.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Matrix(#[from] CscError),

    #[error(transparent)]
    RowView(#[from] CsrError),

    #[error(transparent)]
    Basis(#[from] BasisError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("solve mode {0:?} is not supported")]
    NotSupported(SolveMode),
}

impl SolverError {
    /// Portable status code for the error class.
    pub fn status(&self) -> Status {
        match self {
            SolverError::NotSupported(_) => Status::NotSupported,
            SolverError::Basis(BasisError::SingularBasis { .. })
            | SolverError::Basis(BasisError::SingularPivot { .. }) => Status::Numerical,
            _ => Status::InvalidArgument,
        }
    }
}
