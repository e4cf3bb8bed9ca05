//! Domain model of the brokerage pipeline: entity kinds, lifecycle rules and
//! the operator action policy.

pub mod actions;
pub mod entity;
pub mod lifecycle;
pub mod types;
