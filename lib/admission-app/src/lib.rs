//! High-level application primitives.
//!
//! This crate provides the pieces needed to bootstrap an admission process before it starts doing real work: logging
//! and internal metrics.
#![deny(missing_docs)]

pub mod logging;
pub mod metrics;

/// Common imports.
pub mod prelude {
    pub use super::logging::{fatal_and_exit, initialize_logging};
    pub use super::metrics::{initialize_metrics, MetricsRegistry};
}
