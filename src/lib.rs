//! # bosched
//!
//! **Self-tuning loop scheduling across process runs**
//!
//! A scheduling engine for parallel loops. Each loop region gets a control
//! parameter per execution, the parameter fixes how the iteration space is cut
//! into chunks, and the observed cost feeds a Bayesian-optimization loop that
//! carries its history from one process run to the next.
//!
//! ## Features
//!
//! - **Five self-scheduling policies**: FAC2, FSS, TSS, CSS, and TAPE, each a
//!   closed-form function of `(parameter, iterations, threads)`
//! - **Lock-free distribution**: one atomic per chunk on 64-bit targets, with a
//!   mutex fallback; ordered and doacross loops release chunks in FIFO order
//! - **Warm-up then exploit**: uniform sampling for the first `W` executions,
//!   then online Bayesian optimization or sampling from a pre-trained mixture
//! - **Persistent tuning state**: a JSON snapshot loaded at start and rewritten
//!   at exit
//! - **Load-imbalance statistics**: per-thread busy time, coefficient of
//!   variation, and slowdown per execution
//! - **Flexible Configuration**: files (TOML/YAML/JSON), environment variables,
//!   code, or CLI arguments
//!
//! ## Quick Start
//!
//! ```ignore
//! use bosched::{EngineBuilder, IterationSpace, Policy, RegionId, Schedule, ThreadTeam};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = EngineBuilder::new()
//!         .program("heat")
//!         .env_prefix("BOSCHED")
//!         .surrogate_backend(std::sync::Arc::new(MyGaussianProcess::default()))
//!         .build()?;
//!     let team = ThreadTeam::new("heat", 8)?;
//!
//!     for _step in 0..100 {
//!         team.run(
//!             &engine,
//!             RegionId(1),
//!             Schedule::adaptive(Policy::Fss),
//!             IterationSpace::upto(1 << 20),
//!             |chunk| {
//!                 for i in chunk.values() {
//!                     relax(i);
//!                 }
//!             },
//!         );
//!     }
//!
//!     // Persist what was learned for the next run
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Driving the hooks directly
//!
//! A host runtime with its own thread team calls the hooks itself:
//!
//! ```ignore
//! let param = engine.schedule_parameter(region, schedule.is_adaptive());
//! engine.schedule_begin(region, space.trip_count(), threads);
//! let distributor = Distributor::new(schedule, param, space, threads);
//! // every thread: while let Some(chunk) = distributor.next() { ... }
//! engine.schedule_end(region);
//! ```
//!
//! ## Configuration
//!
//! Configuration sources are merged in order (later sources override earlier):
//!
//! 1. Default values
//! 2. Config files (via `.file()`)
//! 3. Environment variables (via `.env_prefix()`)
//! 4. Programmatic overrides
//! 5. CLI arguments (via `.with_cli_args()`)
//!
//! ### Config File Example (TOML)
//!
//! ```toml
//! program = "heat"
//! state_dir = "/var/lib/heat"
//! warmup_budget = 20
//! strategy = "optimization"
//! update_cadence = "per_execution"
//! statistics = true
//! ```
//!
//! ### Environment Variables
//!
//! With `.env_prefix("BOSCHED")`:
//! - `BOSCHED_DEBUG=true`
//! - `BOSCHED_STATISTICS=true`
//! - `BOSCHED_PROFILE=true`
//! - `BOSCHED_EVALUATION=true`
//! - `BOSCHED_STRATEGY=mixture`
//!
//! ## State Files
//!
//! - Tuning snapshot: `{state_dir}/.bostate.{program}.json`
//! - Statistics: `{state_dir}/.bostats.{program}.json` (only with `statistics`)
//!
//! A missing snapshot means "first run". A snapshot that does not parse stops
//! the engine from starting rather than silently discarding tuning history.

pub mod builder;
pub mod chunk;
pub mod config;
pub mod distributor;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod persist;
pub mod policy;
pub mod profile;
pub mod registry;
pub mod state;
pub mod stats;
pub mod surrogate;
pub mod team;
pub mod workload;

pub use builder::{BoschedArgs, EngineBuilder};
pub use chunk::{Policy, Schedule, ScheduleParameters, Variant};
pub use config::{BoschedConfig, Strategy, UpdateCadence};
pub use distributor::{Chunk, Distributor, IterationSpace};
pub use engine::Engine;
pub use error::{BoschedError, Result};
pub use metrics::BoschedMetrics;
pub use policy::{Mixture, RecordOutcome};
pub use profile::{NoopProfiler, Profiler, TracingProfiler};
pub use state::{LoopState, Mode, RegionId};
pub use stats::{LoopStatistics, WorkRecorder};
pub use surrogate::{Acquisition, FitFailure, SurrogateBackend, SurrogateModel};
pub use team::ThreadTeam;
pub use workload::WorkloadEntry;
