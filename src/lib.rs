//! Coordination core of the brokerage operations console.
//!
//! Tracks leads, clients and cases through their lifecycle, derives the
//! actions an operator may take, and applies operator mutations
//! optimistically to a shared query cache with rollback on failure.

pub mod backend;
pub mod cache;
pub mod coordinator;
pub mod domain;
pub mod error_conversions;
pub mod forms;
pub mod models;
pub mod pagination;
pub mod services;
