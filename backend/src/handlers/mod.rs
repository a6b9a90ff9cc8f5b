//! HTTP handlers for the read-only query surface

pub mod anomalies;
pub mod health;
pub mod locations;
pub mod observations;
pub mod suggestions;

pub use anomalies::*;
pub use health::*;
pub use locations::*;
pub use observations::*;
pub use suggestions::*;
