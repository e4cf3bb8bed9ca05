//! Error conversion glue between layers.
//!
//! The domain layer must not depend on service or backend error types, so
//! conversions out of domain errors live here.

use crate::backend::BackendError;
use crate::coordinator::MutationError;
use crate::domain::types::TypeConstraintError;
use crate::services::ServiceError;

impl From<TypeConstraintError> for ServiceError {
    fn from(val: TypeConstraintError) -> Self {
        ServiceError::TypeConstraint(val.to_string())
    }
}

impl From<TypeConstraintError> for MutationError {
    fn from(val: TypeConstraintError) -> Self {
        MutationError::Validation(val.to_string())
    }
}

impl From<TypeConstraintError> for BackendError {
    fn from(val: TypeConstraintError) -> Self {
        BackendError::Decode(val.to_string())
    }
}
