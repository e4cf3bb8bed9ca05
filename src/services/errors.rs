use thiserror::Error;

use crate::backend::BackendError;
use crate::coordinator::MutationError;
use crate::domain::lifecycle::LifecycleError;
use crate::forms::FormError;

/// Errors surfaced to the console host by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Form error: {0}")]
    Form(String),

    #[error("Type constraint violation: {0}")]
    TypeConstraint(String),

    #[error("Entity not found")]
    NotFound,

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Backend(BackendError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<FormError> for ServiceError {
    fn from(err: FormError) -> Self {
        ServiceError::Form(err.to_string())
    }
}

impl From<BackendError> for ServiceError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound => ServiceError::NotFound,
            other => ServiceError::Backend(other),
        }
    }
}
