//! The bosched engine: lifecycle plus the hooks a parallel runtime calls.
//!
//! ```text
//! Engine::init ──▶ load snapshot ──▶ LoopRegistry
//!                                       │
//!    per execution of a region:         ▼
//!    schedule_parameter ──▶ schedule_begin ──▶ (threads pull chunks) ──▶ schedule_end
//!                                                                         │
//!                                            ParameterPolicy::record ◀────┘
//!
//! Engine::shutdown ──▶ per-run updates ──▶ store snapshot (+ statistics)
//! ```
//!
//! Hook functions never fail. Anything that goes wrong inside them is logged
//! and the hook falls back to a plain value, because the caller is a thread
//! team in the middle of a parallel region with no way to propagate errors.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::chunk::{Policy, Schedule};
use crate::config::{BoschedConfig, Strategy};
use crate::distributor::{Distributor, IterationSpace};
use crate::error::Result;
use crate::metrics::BoschedMetrics;
use crate::persist::{read_json, write_json, Snapshot};
use crate::policy::{
    ExploitationStrategy, Mixture, MixtureSampling, OnlineBayesianOptimization, ParameterPolicy,
    RecordOutcome,
};
use crate::profile::{ProfileBracket, Profiler, TracingProfiler};
use crate::registry::LoopRegistry;
use crate::state::{LoopState, RegionId};
use crate::stats::{LoopStatistics, StatisticsLog, WorkRecorder};
use crate::surrogate::{SurrogateBackend, UnavailableBackend};
use crate::workload::{WorkloadEntry, WorkloadTable};

/// Self-tuning scheduling service for one process run.
///
/// Create one at process start with [`Engine::init`] or
/// [`EngineBuilder`](crate::EngineBuilder), hand a reference to the parallel
/// runtime, and call [`Engine::shutdown`] at exit to persist what was learned.
pub struct Engine {
    config: BoschedConfig,
    registry: LoopRegistry,
    policy: ParameterPolicy,
    rng: Mutex<SmallRng>,
    first_run: bool,
    run_iteration: u64,
    workload: WorkloadTable,
    statistics: Option<Mutex<StatisticsLog>>,
    profiler: ProfileBracket,
    metrics: BoschedMetrics,
}

impl Engine {
    /// Start the engine with no surrogate library and the tracing profiler.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot, mixture, statistics, or workload file exists but
    /// cannot be read or parsed.
    pub fn init(config: BoschedConfig) -> Result<Self> {
        Self::with_components(
            config,
            Arc::new(UnavailableBackend),
            Box::new(TracingProfiler::new()),
        )
    }

    /// Start the engine with an explicit surrogate backend and profiler.
    pub fn with_components(
        config: BoschedConfig,
        backend: Arc<dyn SurrogateBackend>,
        profiler: Box<dyn Profiler>,
    ) -> Result<Self> {
        let state_path = config.state_path();
        let (states, first_run, run_iteration) = match Snapshot::load(&state_path)? {
            Some(snapshot) => {
                info!(
                    path = %state_path.display(),
                    date = %snapshot.date.to_rfc3339(),
                    iteration = snapshot.iteration,
                    loops = snapshot.num_loop,
                    "snapshot loaded"
                );
                let iteration = snapshot.iteration;
                (snapshot.into_states(backend.as_ref())?, false, iteration)
            }
            None => {
                info!(path = %state_path.display(), "no snapshot found, first run");
                (Vec::new(), true, 0)
            }
        };
        let registry = LoopRegistry::from_states(states, config.default_param);

        let epsilon = config.effective_epsilon();
        let strategy: Box<dyn ExploitationStrategy> = match config.strategy {
            Strategy::Optimization => Box::new(OnlineBayesianOptimization::new(
                backend,
                epsilon,
                config.acquisition_budget,
            )),
            Strategy::Mixture => {
                let global = config
                    .mixture_file
                    .as_deref()
                    .map(Mixture::load)
                    .transpose()?;
                Box::new(MixtureSampling::new(global, epsilon))
            }
        };
        let mut policy = ParameterPolicy::new(
            strategy,
            config.effective_warmup_budget(),
            epsilon,
            config.update_cadence,
        );
        if config.evaluation {
            policy = policy.with_evaluation(config.eval_param);
        }

        let workload = config
            .workload_file
            .as_deref()
            .map(WorkloadTable::load)
            .transpose()?
            .unwrap_or_default();

        let statistics = if config.statistics {
            let mut log: StatisticsLog = read_json(&config.statistics_path())?.unwrap_or_default();
            log.retain_latest(config.statistics_retention);
            Some(Mutex::new(log))
        } else {
            None
        };

        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let metrics = BoschedMetrics::new();
        if let Some(ref registry) = config.prometheus_registry {
            if let Err(e) = metrics.register(registry) {
                warn!(%e, "failed to register prometheus metrics");
            }
        }
        let active = registry
            .all()
            .iter()
            .filter(|(_, handle)| !handle.lock().is_warming_up())
            .count();
        metrics.set_regions(registry.len(), active);

        info!(
            program = %config.program,
            strategy = policy.strategy_name(),
            warmup_budget = policy.warmup_budget(),
            regions = registry.len(),
            active,
            first_run,
            evaluation = config.evaluation,
            statistics = config.statistics,
            "bosched engine initialized"
        );

        let profiler = ProfileBracket::new(profiler, config.profile, config.profile_executions);

        Ok(Self {
            config,
            registry,
            policy,
            rng: Mutex::new(rng),
            first_run,
            run_iteration,
            workload,
            statistics,
            profiler,
            metrics,
        })
    }

    /// Control value for the next execution of `region`.
    ///
    /// `adaptive` is false for schedules that do not feed the tuner; those get
    /// the region's current value unchanged and record nothing.
    pub fn schedule_parameter(&self, region: RegionId, adaptive: bool) -> f64 {
        let handle = self.registry.get_or_create(region);
        let mut state = handle.lock();
        let param = self
            .policy
            .select(&mut state, adaptive, &mut self.rng.lock());

        self.metrics.regions.set(self.registry.len() as i64);
        if self.policy.is_evaluating() {
            self.metrics.evaluation_requests.inc();
        }
        if self.config.debug {
            debug!(
                region = %region,
                adaptive,
                param,
                mode = ?state.mode(),
                iteration = state.iteration,
                "schedule parameter"
            );
        }
        param
    }

    /// Mark the start of an execution of `region` over `tasks` iterations.
    pub fn schedule_begin(&self, region: RegionId, tasks: u64, threads: usize) {
        let handle = self.registry.get_or_create(region);
        let mut state = handle.lock();
        state.task_count = tasks;
        state.thread_count = threads;
        state.executions += 1;
        state.work = self
            .statistics
            .as_ref()
            .map(|_| Arc::new(WorkRecorder::new(threads)));
        state.loop_start();

        if self.config.debug {
            debug!(
                region = %region,
                tasks,
                threads,
                execution = state.executions,
                "schedule begin"
            );
        }
    }

    /// Mark the end of the execution in flight and learn from its cost.
    ///
    /// The cost is wall time in milliseconds per task.
    pub fn schedule_end(&self, region: RegionId) {
        let Some(handle) = self.registry.get(region) else {
            warn!(region = %region, "schedule_end for unknown region");
            return;
        };
        let mut state = handle.lock();
        let Some(elapsed) = state.loop_stop() else {
            warn!(region = %region, "schedule_end without schedule_begin");
            return;
        };

        let parallel_time = elapsed.as_secs_f64() * 1e3;
        let cost = parallel_time / state.task_count.max(1) as f64;
        self.metrics.record_execution(cost);

        let outcome = self.policy.record(&mut state, cost, &mut self.rng.lock());
        self.metrics.record_outcome(&outcome);

        if let Some(ref log) = self.statistics {
            let work = state
                .work
                .take()
                .map(|recorder| recorder.work_per_processor())
                .unwrap_or_default();
            let sample = LoopStatistics::evaluate(parallel_time, state.thread_count, &work);
            if self.config.debug {
                debug!(
                    region = %region,
                    parallel_time = sample.parallel_time,
                    work_time = sample.work_time,
                    performance = sample.performance,
                    cost = sample.cost,
                    effectiveness = sample.effectiveness,
                    cov = sample.coefficient_of_variation,
                    slowdown = sample.slowdown,
                    "loop statistics"
                );
            }
            log.lock().push(region, sample);
        }

        if self.config.debug {
            debug!(
                region = %region,
                cost,
                param = state.param,
                outcome = ?outcome,
                "schedule end"
            );
        }
    }

    /// Precomputed entry for a non-adaptive policy.
    ///
    /// # Errors
    ///
    /// Returns [`BoschedError::MissingWorkload`](crate::BoschedError::MissingWorkload)
    /// when the table has no entry; the region cannot be scheduled without it.
    pub fn fixed_parameter(&self, region: RegionId, policy: Policy) -> Result<&WorkloadEntry> {
        self.workload.lookup(region, policy)
    }

    /// Open the profiling bracket for the execution of `region` in flight.
    ///
    /// Call between [`schedule_begin`](Self::schedule_begin) and
    /// [`schedule_end`](Self::schedule_end). The execution index comes from the
    /// region's own counter, so only its first `profile_executions` executions
    /// in this run are captured. Returns whether capture started.
    pub fn profile_start(&self, region: RegionId) -> bool {
        if !self.profiler.is_enabled() {
            return false;
        }
        let Some(handle) = self.registry.get(region) else {
            return false;
        };
        let executions = handle.lock().executions;
        if executions == 0 {
            return false;
        }
        self.profiler.start(region, executions - 1)
    }

    /// Close the profiling bracket. Returns whether one was open.
    pub fn profile_stop(&self) -> bool {
        self.profiler.stop()
    }

    /// Parameter selection, execution start, and chunk distribution in one call.
    ///
    /// The caller drives the returned distributor and calls
    /// [`schedule_end`](Self::schedule_end) once every thread is done.
    pub fn open_region(
        &self,
        region: RegionId,
        schedule: Schedule,
        space: IterationSpace,
        threads: usize,
    ) -> Distributor {
        let param = self.schedule_parameter(region, schedule.is_adaptive());
        self.schedule_begin(region, space.trip_count(), threads);
        Distributor::new(schedule, param, space, threads)
    }

    /// Busy-time recorder of the execution in flight, if statistics are enabled.
    pub fn work_recorder(&self, region: RegionId) -> Option<Arc<WorkRecorder>> {
        self.registry
            .get(region)
            .and_then(|handle| handle.lock().work.clone())
    }

    /// Statistics collected for `region`, oldest first.
    pub fn statistics(&self, region: RegionId) -> Vec<LoopStatistics> {
        self.statistics
            .as_ref()
            .map(|log| log.lock().get(region).to_vec())
            .unwrap_or_default()
    }

    /// Run `f` against the state of `region`, if it exists.
    pub fn inspect<R>(&self, region: RegionId, f: impl FnOnce(&LoopState) -> R) -> Option<R> {
        self.registry.get(region).map(|handle| f(&handle.lock()))
    }

    /// Whether no snapshot existed at start.
    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    /// Number of earlier runs that stored the snapshot.
    pub fn run_iteration(&self) -> u64 {
        self.run_iteration
    }

    pub fn config(&self) -> &BoschedConfig {
        &self.config
    }

    pub fn metrics(&self) -> &BoschedMetrics {
        &self.metrics
    }

    pub fn region_count(&self) -> usize {
        self.registry.len()
    }

    /// Finish the run: apply per-run updates and persist every region.
    ///
    /// Evaluation runs leave the snapshot untouched.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot or statistics file cannot be written.
    pub fn shutdown(self) -> Result<()> {
        self.profiler.stop();

        for (_, handle) in self.registry.all() {
            let outcome = self.policy.finish_run(&mut handle.lock());
            if outcome != RecordOutcome::Skipped {
                self.metrics.record_outcome(&outcome);
            }
        }

        if self.policy.is_evaluating() {
            info!(
                regions = self.registry.len(),
                "evaluation run, snapshot left unchanged"
            );
        } else {
            let path = self.config.state_path();
            let snapshot = Snapshot::capture(&self.registry, self.run_iteration + 1);
            snapshot.store(&path)?;
            info!(
                path = %path.display(),
                iteration = snapshot.iteration,
                loops = snapshot.num_loop,
                "snapshot stored"
            );
        }

        if let Some(log) = self.statistics {
            let path = self.config.statistics_path();
            let mut log = log.into_inner();
            log.retain_latest(self.config.statistics_retention);
            write_json(&path, &log)?;
            info!(path = %path.display(), "statistics stored");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("program", &self.config.program)
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("first_run", &self.first_run)
            .field("run_iteration", &self.run_iteration)
            .field("profiler", &self.profiler)
            .finish_non_exhaustive()
    }
}
