//! Configuration types for the bosched engine.

use std::path::PathBuf;

use prometheus::Registry;
use serde::{Deserialize, Serialize};

/// Default warm-up budget (W): observations collected before model-based tuning.
pub const DEFAULT_WARMUP_BUDGET: usize = 20;

/// Default lower bound of the warm-up uniform draw.
pub const DEFAULT_EPSILON: f64 = 1e-7;

/// Default number of candidate points per acquisition-maximization step.
pub const DEFAULT_ACQUISITION_BUDGET: usize = 1000;

/// Parameter handed to a region that has never been tuned.
pub const DEFAULT_PARAM: f64 = 0.5;

/// Exploitation strategy used once a region leaves warm-up.
///
/// Selected once per process configuration, never per run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Online Bayesian optimization against a surrogate model.
    #[default]
    Optimization,
    /// Sampling from a pre-trained Gaussian mixture.
    Mixture,
}

/// When the surrogate model of an Active region is updated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateCadence {
    /// Update after every execution of the region.
    #[default]
    PerExecution,
    /// Update once at shutdown with the mean cost of the whole run.
    PerRun,
}

/// Configuration for the bosched engine.
///
/// This struct can be deserialized from TOML, YAML, JSON, or environment variables
/// using figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoschedConfig {
    /// Program name used to derive state file names (default: executable stem)
    #[serde(default = "default_program")]
    pub program: String,

    /// Directory holding the snapshot files (default: ".")
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Number of warm-up observations before model-based tuning (default: 20)
    #[serde(default = "default_warmup_budget")]
    pub warmup_budget: usize,

    /// Lower bound of the warm-up draw (default: 1e-7)
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Candidate points per acquisition step (default: 1000)
    #[serde(default = "default_acquisition_budget")]
    pub acquisition_budget: usize,

    /// Parameter of a freshly created region (default: 0.5)
    #[serde(default = "default_param")]
    pub default_param: f64,

    /// Exploitation strategy (default: optimization)
    #[serde(default)]
    pub strategy: Strategy,

    /// Surrogate update timing (default: per_execution)
    #[serde(default)]
    pub update_cadence: UpdateCadence,

    /// Verbose per-hook debug logging
    #[serde(default)]
    pub debug: bool,

    /// Collect and persist load-imbalance statistics
    #[serde(default)]
    pub statistics: bool,

    /// Samples kept per region in the statistics file; oldest are dropped (default: 10000)
    #[serde(default = "default_statistics_retention")]
    pub statistics_retention: usize,

    /// Enable the profiling bracket hooks
    #[serde(default)]
    pub profile: bool,

    /// Executions per region bracketed by the profiler (default: 4)
    #[serde(default = "default_profile_executions")]
    pub profile_executions: u64,

    /// Evaluation mode: hand out frozen parameters and record nothing
    #[serde(default)]
    pub evaluation: bool,

    /// Global evaluation parameter; a region's own `eval_param` takes precedence
    #[serde(default)]
    pub eval_param: Option<f64>,

    /// JSON file holding a global mixture for the mixture strategy
    #[serde(default)]
    pub mixture_file: Option<PathBuf>,

    /// JSON workload-parameter table for non-adaptive policies
    #[serde(default)]
    pub workload_file: Option<PathBuf>,

    /// Seed for the shared random source (default: entropy)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Prometheus registry for metrics exposition.
    /// Not serializable - must be set programmatically.
    #[serde(skip)]
    pub prometheus_registry: Option<Registry>,
}

fn default_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "bosched".to_string())
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_warmup_budget() -> usize {
    DEFAULT_WARMUP_BUDGET
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_acquisition_budget() -> usize {
    DEFAULT_ACQUISITION_BUDGET
}

fn default_param() -> f64 {
    DEFAULT_PARAM
}

fn default_profile_executions() -> u64 {
    4
}

fn default_statistics_retention() -> usize {
    10_000
}

impl Default for BoschedConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            state_dir: default_state_dir(),
            warmup_budget: default_warmup_budget(),
            epsilon: default_epsilon(),
            acquisition_budget: default_acquisition_budget(),
            default_param: default_param(),
            strategy: Strategy::default(),
            update_cadence: UpdateCadence::default(),
            debug: false,
            statistics: false,
            statistics_retention: default_statistics_retention(),
            profile: false,
            profile_executions: default_profile_executions(),
            evaluation: false,
            eval_param: None,
            mixture_file: None,
            workload_file: None,
            seed: None,
            prometheus_registry: None,
        }
    }
}

impl BoschedConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the tuning snapshot: `<state_dir>/.bostate.<program>.json`.
    pub fn state_path(&self) -> PathBuf {
        self.state_dir
            .join(format!(".bostate.{}.json", self.program))
    }

    /// Path of the statistics snapshot: `<state_dir>/.bostats.<program>.json`.
    pub fn statistics_path(&self) -> PathBuf {
        self.state_dir
            .join(format!(".bostats.{}.json", self.program))
    }

    /// Get the effective warm-up budget.
    ///
    /// A budget of zero would activate regions with no data, so at least one
    /// observation is always required.
    pub fn effective_warmup_budget(&self) -> usize {
        self.warmup_budget.max(1)
    }

    /// Get the effective lower bound of the warm-up draw, kept inside `(0, 1)`.
    pub fn effective_epsilon(&self) -> f64 {
        if self.epsilon.is_finite() && self.epsilon > 0.0 && self.epsilon < 1.0 {
            self.epsilon
        } else {
            DEFAULT_EPSILON
        }
    }
}
