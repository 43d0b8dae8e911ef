//! Shared building blocks for the key-value server crates:
//! logging setup, runtime checks, response types and metrics.

pub mod env;
pub mod metrics;
pub mod types;
pub mod utils;
