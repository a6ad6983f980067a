//! Metrics collection for bosched observability.
//!
//! Prometheus-compatible counters and gauges for the tuning engine. Metrics are
//! always collected (atomic operations) and can optionally be exposed via a
//! Prometheus registry passed to the builder.
//!
//! # Available Metrics
//!
//! ## Gauges
//!
//! - `bosched_regions` - Loop regions known to the registry
//! - `bosched_active_regions` - Loop regions past warm-up
//! - `bosched_last_cost_ms` - Per-task cost of the most recent execution
//!
//! ## Counters
//!
//! - `bosched_executions` - Region executions observed
//! - `bosched_warmup_samples` - Warm-up observations recorded
//! - `bosched_activations` - Regions that left warm-up
//! - `bosched_fit_failures` - Failed surrogate fits
//! - `bosched_surrogate_updates` - Successful surrogate updates
//! - `bosched_update_failures` - Failed surrogate updates
//! - `bosched_evaluation_requests` - Parameters handed out in evaluation mode
//!
//! # Example
//!
//! ```ignore
//! use prometheus::{Registry, TextEncoder};
//! use bosched::EngineBuilder;
//!
//! let registry = Registry::new();
//! let engine = EngineBuilder::new()
//!     .prometheus_registry(registry.clone())
//!     .build()?;
//!
//! let mut buffer = String::new();
//! TextEncoder::new().encode_utf8(&registry.gather(), &mut buffer)?;
//! ```

mod prometheus;

pub use prometheus::BoschedMetrics;
