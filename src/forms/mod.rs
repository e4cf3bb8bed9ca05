//! Operator input forms and their conversion into validated payloads.

use thiserror::Error;
use validator::ValidationErrors;

pub mod activity;
pub mod lifecycle;

#[derive(Debug, Error)]
/// Errors that can occur when processing form data.
pub enum FormError {
    #[error("validation errors: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("note content cannot be empty")]
    EmptyContent,

    #[error("{0}")]
    InvalidStatus(String),

    #[error("a reason is required to mark as {0}")]
    ReasonRequired(&'static str),

    #[error("unknown stage '{0}'")]
    InvalidStage(String),
}
