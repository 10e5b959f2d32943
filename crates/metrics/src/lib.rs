//! Metrics collection and export for howl.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are served in Prometheus format
//! from a dedicated listener.
//!
//! # Usage
//!
//! ```rust,ignore
//! use howl_metrics::{counter, gauge, fleet};
//!
//! counter!(fleet::SESSIONS_ASSIGNED_TOTAL).increment(1);
//! gauge!(fleet::WORKERS_ACTIVE).set(3.0);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
