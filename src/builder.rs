//! Builder pattern for constructing the bosched engine.
//!
//! The builder supports multiple configuration sources using figment:
//! - Default values
//! - Config files (TOML, YAML, JSON)
//! - Environment variables
//! - Programmatic overrides
//! - CLI arguments via clap

use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use prometheus::Registry;

use crate::config::{BoschedConfig, Strategy, UpdateCadence};
use crate::engine::Engine;
use crate::error::Result;
use crate::profile::{Profiler, TracingProfiler};
use crate::surrogate::{SurrogateBackend, UnavailableBackend};

/// Builder for constructing an [`Engine`].
///
/// Configuration sources are merged in the following order (later sources override earlier):
/// 1. Default values
/// 2. Config files (in order added)
/// 3. Environment variables
/// 4. Programmatic overrides
///
/// # Examples
///
/// ```ignore
/// use bosched::EngineBuilder;
///
/// let engine = EngineBuilder::new()
///     .file("bosched.toml")
///     .env_prefix("BOSCHED")
///     .program("heat")
///     .surrogate_backend(Arc::new(MyGaussianProcess::default()))
///     .build()?;
/// ```
pub struct EngineBuilder {
    figment: Figment,
    prometheus_registry: Option<Registry>,
    backend: Option<Arc<dyn SurrogateBackend>>,
    profiler: Option<Box<dyn Profiler>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("figment", &self.figment)
            .field(
                "prometheus_registry",
                &self.prometheus_registry.as_ref().map(|_| "<Registry>"),
            )
            .field("backend", &self.backend.as_ref().map(|_| "<SurrogateBackend>"))
            .field("profiler", &self.profiler.as_ref().map(|_| "<Profiler>"))
            .finish()
    }
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(BoschedConfig::default())),
            prometheus_registry: None,
            backend: None,
            profiler: None,
        }
    }

    /// Add a configuration file.
    ///
    /// Supports TOML, YAML, and JSON formats (detected by extension).
    /// Files are merged in the order they are added.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        self.figment = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => self.figment.merge(Yaml::file(path)),
            "json" => self.figment.merge(Json::file(path)),
            // TOML is the default
            _ => self.figment.merge(Toml::file(path)),
        };
        self
    }

    /// Add environment variables with a prefix.
    ///
    /// Environment variables are expected in the format `{PREFIX}_{KEY}`,
    /// e.g., `BOSCHED_DEBUG`, `BOSCHED_WARMUP_BUDGET`.
    ///
    /// # Arguments
    ///
    /// * `prefix` - The environment variable prefix (without trailing underscore)
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.figment = self.figment.merge(Env::prefixed(&format!("{prefix}_")));
        self
    }

    fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.figment = self.figment.merge(Serialized::default(key, value));
        self
    }

    /// Set the program name used to derive state file names.
    pub fn program(self, program: impl Into<String>) -> Self {
        self.set("program", program.into())
    }

    /// Set the directory holding the snapshot files.
    pub fn state_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.set("state_dir", dir.into())
    }

    /// Set the warm-up budget (observations before model-based tuning).
    pub fn warmup_budget(self, n: usize) -> Self {
        self.set("warmup_budget", n)
    }

    /// Set the lower bound of the warm-up draw.
    pub fn epsilon(self, epsilon: f64) -> Self {
        self.set("epsilon", epsilon)
    }

    /// Set the number of candidate points per acquisition step.
    pub fn acquisition_budget(self, n: usize) -> Self {
        self.set("acquisition_budget", n)
    }

    /// Set the parameter of a freshly created region.
    pub fn default_param(self, param: f64) -> Self {
        self.set("default_param", param)
    }

    pub fn strategy(self, strategy: Strategy) -> Self {
        self.set("strategy", strategy)
    }

    pub fn update_cadence(self, cadence: UpdateCadence) -> Self {
        self.set("update_cadence", cadence)
    }

    /// Enable verbose per-hook debug logging.
    pub fn debug(self, enabled: bool) -> Self {
        self.set("debug", enabled)
    }

    /// Collect and persist load-imbalance statistics.
    pub fn statistics(self, enabled: bool) -> Self {
        self.set("statistics", enabled)
    }

    /// Keep at most `samples` statistics per region across runs.
    pub fn statistics_retention(self, samples: usize) -> Self {
        self.set("statistics_retention", samples)
    }

    /// Enable the profiling bracket for the first `executions` of each region.
    pub fn profile(self, executions: u64) -> Self {
        self.set("profile", true)
            .set("profile_executions", executions)
    }

    /// Freeze parameters for evaluation. `eval_param` is the global fallback
    /// for regions without their own frozen value.
    pub fn evaluation(self, eval_param: Option<f64>) -> Self {
        self.set("evaluation", true).set("eval_param", eval_param)
    }

    /// Global mixture for the mixture strategy.
    pub fn mixture_file(self, path: impl Into<PathBuf>) -> Self {
        self.set("mixture_file", path.into())
    }

    /// Workload-parameter table for non-adaptive policies.
    pub fn workload_file(self, path: impl Into<PathBuf>) -> Self {
        self.set("workload_file", path.into())
    }

    /// Seed the shared random source for reproducible runs.
    pub fn seed(self, seed: u64) -> Self {
        self.set("seed", seed)
    }

    /// Surrogate-model library used by the optimization strategy.
    ///
    /// Without one, regions stay in warm-up.
    pub fn surrogate_backend(mut self, backend: Arc<dyn SurrogateBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Profiler driven by the profiling bracket (default: [`TracingProfiler`]).
    pub fn profiler(mut self, profiler: Box<dyn Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Provide an external Prometheus registry for metrics exposition.
    pub fn prometheus_registry(mut self, registry: Registry) -> Self {
        self.prometheus_registry = Some(registry);
        self
    }

    /// Apply CLI argument overrides.
    ///
    /// This method applies any non-None values from the `BoschedArgs` struct.
    pub fn with_cli_args(mut self, args: &BoschedArgs) -> Self {
        if let Some(ref program) = args.bosched_program {
            self = self.set("program", program.clone());
        }
        if let Some(ref dir) = args.bosched_state_dir {
            self = self.set("state_dir", dir.clone());
        }
        if let Some(n) = args.bosched_warmup_budget {
            self = self.set("warmup_budget", n);
        }
        if let Some(ref strategy) = args.bosched_strategy {
            self = self.set("strategy", strategy.clone());
        }
        if args.bosched_debug {
            self = self.set("debug", true);
        }
        if args.bosched_statistics {
            self = self.set("statistics", true);
        }
        if args.bosched_profile {
            self = self.set("profile", true);
        }
        if args.bosched_evaluation {
            self = self.set("evaluation", true);
        }
        if let Some(param) = args.bosched_eval_param {
            self = self.set("eval_param", param);
        }
        if let Some(seed) = args.bosched_seed {
            self = self.set("seed", seed);
        }
        self
    }

    fn extract(&self) -> Result<BoschedConfig> {
        Ok(self.figment.extract().map_err(Box::new)?)
    }

    /// Build the engine.
    ///
    /// This extracts the configuration, loads the previous snapshot and any
    /// configured tables, and constructs the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration extraction fails
    /// - The snapshot, mixture, or workload file exists but is malformed
    /// - A persisted surrogate cannot be restored
    pub fn build(self) -> Result<Engine> {
        let mut config = self.extract()?;
        config.prometheus_registry = self.prometheus_registry;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(UnavailableBackend));
        let profiler = self
            .profiler
            .unwrap_or_else(|| Box::new(TracingProfiler::new()));
        Engine::with_components(config, backend, profiler)
    }
}

/// CLI arguments for bosched configuration.
///
/// Use with clap's `Parser` derive macro. These arguments can be applied
/// to an `EngineBuilder` using `with_cli_args`.
///
/// # Examples
///
/// ```ignore
/// use clap::Parser;
/// use bosched::{BoschedArgs, EngineBuilder};
///
/// #[derive(Parser)]
/// struct MyArgs {
///     #[command(flatten)]
///     bosched: BoschedArgs,
/// }
///
/// let args = MyArgs::parse();
/// let engine = EngineBuilder::new()
///     .with_cli_args(&args.bosched)
///     .build()?;
/// ```
#[derive(Debug, Default, Clone, clap::Args)]
pub struct BoschedArgs {
    /// Program name for the state files
    #[arg(long)]
    pub bosched_program: Option<String>,

    /// Directory holding the state files
    #[arg(long)]
    pub bosched_state_dir: Option<PathBuf>,

    /// Warm-up observations before model-based tuning
    #[arg(long)]
    pub bosched_warmup_budget: Option<usize>,

    /// Exploitation strategy ("optimization" or "mixture")
    #[arg(long)]
    pub bosched_strategy: Option<String>,

    /// Verbose debug logging
    #[arg(long)]
    pub bosched_debug: bool,

    /// Collect load-imbalance statistics
    #[arg(long)]
    pub bosched_statistics: bool,

    /// Enable the profiling bracket
    #[arg(long)]
    pub bosched_profile: bool,

    /// Freeze parameters for evaluation
    #[arg(long)]
    pub bosched_evaluation: bool,

    /// Global evaluation parameter
    #[arg(long)]
    pub bosched_eval_param: Option<f64>,

    /// Seed for the random source
    #[arg(long)]
    pub bosched_seed: Option<u64>,
}
