//! Operator-facing entry points.
//!
//! Services validate forms, run mutations through the coordinator and serve
//! reads through the cache. Backends are passed in as trait implementations
//! so hosts and tests can swap the transport.

pub mod activity;
pub mod errors;
pub mod lifecycle;
pub mod queries;

pub use errors::{ServiceError, ServiceResult};
