//! Prometheus metrics for bosched tuning activity.
//!
//! Counters and gauges work standalone without a Registry; registration is
//! only needed for exposition (scraping). Metric names use a `{prefix}_`
//! prefix (default: "bosched").
//!
//! | Operation | Overhead |
//! |-----------|----------|
//! | Counter increment | atomic fetch_add |
//! | Gauge set | atomic store |
//! | Registry lookup | never (direct field access) |

use prometheus::{Gauge, IntCounter, IntGauge, Opts, Registry};

use crate::policy::RecordOutcome;

/// Prometheus metrics for the tuning engine.
#[derive(Clone)]
pub struct BoschedMetrics {
    // === Gauges (current values) ===
    /// Regions known to the registry
    pub regions: IntGauge,

    /// Regions that finished warm-up
    pub active_regions: IntGauge,

    /// Per-task cost of the most recent execution (ms)
    pub last_cost: Gauge,

    // === Counters (cumulative) ===
    /// Region executions observed
    pub executions: IntCounter,

    /// Warm-up observations recorded
    pub warmup_samples: IntCounter,

    /// Regions that left warm-up
    pub activations: IntCounter,

    /// Failed surrogate fits at the end of warm-up
    pub fit_failures: IntCounter,

    /// Successful surrogate updates
    pub surrogate_updates: IntCounter,

    /// Failed surrogate updates
    pub update_failures: IntCounter,

    /// Parameters handed out in evaluation mode
    pub evaluation_requests: IntCounter,
}

impl Default for BoschedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(prefix: &str, name: &str, help: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(format!("{prefix}_{name}"), help))
        .expect("metric creation should not fail")
}

fn int_gauge(prefix: &str, name: &str, help: &str) -> IntGauge {
    IntGauge::with_opts(Opts::new(format!("{prefix}_{name}"), help))
        .expect("metric creation should not fail")
}

/// Replace characters that are invalid in a Prometheus metric name.
///
/// Valid chars: `[a-zA-Z_:]` for the first char, `[a-zA-Z0-9_:]` for the rest.
fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let valid =
                c.is_ascii_alphabetic() || c == '_' || c == ':' || (i > 0 && c.is_ascii_digit());
            if valid {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl BoschedMetrics {
    /// Create metrics with default prefix "bosched".
    pub fn new() -> Self {
        Self::with_prefix("bosched")
    }

    /// Create metrics with a custom prefix, sanitized for Prometheus
    /// (`my-app` becomes `my_app`).
    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = sanitize_prefix(prefix);
        Self {
            regions: int_gauge(&prefix, "regions", "Loop regions known to the registry"),
            active_regions: int_gauge(&prefix, "active_regions", "Loop regions past warm-up"),
            last_cost: Gauge::with_opts(Opts::new(
                format!("{prefix}_last_cost_ms"),
                "Per-task cost of the most recent execution",
            ))
            .expect("metric creation should not fail"),

            executions: counter(&prefix, "executions", "Region executions observed"),
            warmup_samples: counter(&prefix, "warmup_samples", "Warm-up observations recorded"),
            activations: counter(&prefix, "activations", "Regions that left warm-up"),
            fit_failures: counter(&prefix, "fit_failures", "Failed surrogate fits"),
            surrogate_updates: counter(&prefix, "surrogate_updates", "Successful surrogate updates"),
            update_failures: counter(&prefix, "update_failures", "Failed surrogate updates"),
            evaluation_requests: counter(
                &prefix,
                "evaluation_requests",
                "Parameters handed out in evaluation mode",
            ),
        }
    }

    /// Register all metrics with a Registry for exposition.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register (e.g., duplicate names).
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.regions.clone()))?;
        registry.register(Box::new(self.active_regions.clone()))?;
        registry.register(Box::new(self.last_cost.clone()))?;
        registry.register(Box::new(self.executions.clone()))?;
        registry.register(Box::new(self.warmup_samples.clone()))?;
        registry.register(Box::new(self.activations.clone()))?;
        registry.register(Box::new(self.fit_failures.clone()))?;
        registry.register(Box::new(self.surrogate_updates.clone()))?;
        registry.register(Box::new(self.update_failures.clone()))?;
        registry.register(Box::new(self.evaluation_requests.clone()))?;
        Ok(())
    }

    /// Count the result of feeding one cost into the controller.
    #[inline]
    pub fn record_outcome(&self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Sampled => self.warmup_samples.inc(),
            RecordOutcome::Activated => {
                self.warmup_samples.inc();
                self.activations.inc();
                self.active_regions.inc();
            }
            RecordOutcome::ActivationFailed(_) => {
                self.warmup_samples.inc();
                self.fit_failures.inc();
            }
            RecordOutcome::Updated => self.surrogate_updates.inc(),
            RecordOutcome::UpdateFailed(_) => self.update_failures.inc(),
            RecordOutcome::Pending | RecordOutcome::Skipped => {}
        }
    }

    /// Record the end of one region execution.
    #[inline]
    pub fn record_execution(&self, cost: f64) {
        self.executions.inc();
        self.last_cost.set(cost);
    }

    /// Update the region gauges.
    #[inline]
    pub fn set_regions(&self, total: usize, active: usize) {
        self.regions.set(total as i64);
        self.active_regions.set(active as i64);
    }
}

impl std::fmt::Debug for BoschedMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoschedMetrics")
            .field("regions", &self.regions.get())
            .field("active_regions", &self.active_regions.get())
            .field("executions", &self.executions.get())
            .field("surrogate_updates", &self.surrogate_updates.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surrogate::FitFailure;

    #[test]
    fn test_metrics_creation() {
        let metrics = BoschedMetrics::new();
        assert_eq!(metrics.regions.get(), 0);
        assert_eq!(metrics.executions.get(), 0);
    }

    #[test]
    fn test_outcome_counting() {
        let metrics = BoschedMetrics::new();

        metrics.record_outcome(&RecordOutcome::Sampled);
        metrics.record_outcome(&RecordOutcome::ActivationFailed(FitFailure::Singular));
        metrics.record_outcome(&RecordOutcome::Activated);
        assert_eq!(metrics.warmup_samples.get(), 3);
        assert_eq!(metrics.fit_failures.get(), 1);
        assert_eq!(metrics.activations.get(), 1);
        assert_eq!(metrics.active_regions.get(), 1);

        metrics.record_outcome(&RecordOutcome::Updated);
        metrics.record_outcome(&RecordOutcome::UpdateFailed(FitFailure::Singular));
        metrics.record_outcome(&RecordOutcome::Skipped);
        assert_eq!(metrics.surrogate_updates.get(), 1);
        assert_eq!(metrics.update_failures.get(), 1);
    }

    #[test]
    fn test_gauge_updates() {
        let metrics = BoschedMetrics::new();
        metrics.set_regions(5, 2);
        assert_eq!(metrics.regions.get(), 5);
        assert_eq!(metrics.active_regions.get(), 2);

        metrics.record_execution(0.25);
        assert_eq!(metrics.executions.get(), 1);
        assert!((metrics.last_cost.get() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_registry_integration() {
        let metrics = BoschedMetrics::new();
        let registry = Registry::new();
        metrics
            .register(&registry)
            .expect("registration should succeed");

        metrics.record_execution(1.0);
        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "bosched_executions"));
    }

    #[test]
    fn test_custom_prefix() {
        let metrics = BoschedMetrics::with_prefix("my-app");
        let registry = Registry::new();
        metrics
            .register(&registry)
            .expect("registration should succeed");

        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "my_app_regions"));
        assert!(!families.iter().any(|f| f.get_name() == "bosched_regions"));
    }

    #[test]
    fn test_sanitize_prefix() {
        assert_eq!(sanitize_prefix("9lives"), "_lives");
        assert_eq!(sanitize_prefix("a.b:c1"), "a_b:c1");
    }

    #[test]
    fn test_metrics_clone() {
        let metrics = BoschedMetrics::new();
        metrics.record_execution(1.0);
        let cloned = metrics.clone();
        cloned.record_execution(2.0);
        assert_eq!(metrics.executions.get(), 2);
    }
}
