//! Shared types and models for the skywatch weather anomaly pipeline.
//!
//! This crate contains the domain rows, wire envelopes, and validation
//! helpers shared between the pipeline binaries (seed, collector, persister,
//! detector) and the read-only query server.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
