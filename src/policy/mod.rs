//! Parameter controller.
//!
//! Every region walks the same state machine:
//!
//! ```text
//! WarmingUp ── W observations + successful activation ──▶ Active
//!    │  ▲                                                   │
//!    └──┘ uniform (ε, 1) draws                              └── strategy picks values
//! ```
//!
//! The warm-up protocol is shared. What happens once a region is Active is
//! delegated to an [`ExploitationStrategy`], chosen once per process:
//! [`OnlineBayesianOptimization`] or [`MixtureSampling`]. Evaluation mode
//! overrides both and hands out a frozen value without recording anything.

mod mixture;
mod optimization;
mod warmup;

pub use mixture::{Mixture, MixtureSampling};
pub use optimization::OnlineBayesianOptimization;
pub use warmup::WarmupSampler;

use rand::rngs::SmallRng;
use tracing::{info, warn};

use crate::config::UpdateCadence;
use crate::state::{LoopState, Phase};
use crate::surrogate::FitFailure;

/// Warm-up history kept per region, in multiples of the warm-up budget.
///
/// A region whose fits keep failing slides over its most recent samples
/// instead of growing its history without bound.
pub const WARMUP_HISTORY_FACTOR: usize = 2;

/// Exploitation behavior of Active regions.
pub trait ExploitationStrategy: Send + Sync + std::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Leave warm-up. On success the region is Active; on failure it is untouched.
    fn activate(&self, state: &mut LoopState, rng: &mut SmallRng) -> Result<(), FitFailure>;

    /// Value for the next execution of an Active region.
    fn next_param(&self, state: &mut LoopState, rng: &mut SmallRng) -> f64;

    /// Record the cost of one Active execution.
    fn observe(&self, state: &mut LoopState, cost: f64);

    /// Fold recorded costs into the model. `Ok(false)` when there was nothing to do.
    fn update(&self, state: &mut LoopState) -> Result<bool, FitFailure>;
}

/// What [`ParameterPolicy::record`] or [`ParameterPolicy::finish_run`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Warm-up observation appended
    Sampled,
    /// Warm-up ended and the region is now Active
    Activated,
    /// Warm-up budget reached but the strategy could not activate
    ActivationFailed(FitFailure),
    /// Cost stored until the next update
    Pending,
    /// Surrogate updated with a new parameter
    Updated,
    /// Update failed; parameter and iteration unchanged
    UpdateFailed(FitFailure),
    /// Nothing recorded
    Skipped,
}

/// Warm-up protocol plus a swappable exploitation strategy.
#[derive(Debug)]
pub struct ParameterPolicy {
    warmup: WarmupSampler,
    warmup_budget: usize,
    strategy: Box<dyn ExploitationStrategy>,
    cadence: UpdateCadence,
    evaluation: bool,
    eval_param: Option<f64>,
}

impl ParameterPolicy {
    pub fn new(
        strategy: Box<dyn ExploitationStrategy>,
        warmup_budget: usize,
        epsilon: f64,
        cadence: UpdateCadence,
    ) -> Self {
        Self {
            warmup: WarmupSampler::new(epsilon),
            warmup_budget: warmup_budget.max(1),
            strategy,
            cadence,
            evaluation: false,
            eval_param: None,
        }
    }

    /// Freeze every region; `eval_param` is the fallback when a region has none.
    pub fn with_evaluation(mut self, eval_param: Option<f64>) -> Self {
        self.evaluation = true;
        self.eval_param = eval_param;
        self
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluation
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn warmup_budget(&self) -> usize {
        self.warmup_budget
    }

    /// Most warm-up observations a region retains.
    pub fn warmup_history(&self) -> usize {
        self.warmup_budget * WARMUP_HISTORY_FACTOR
    }

    /// Choose the control value for the next execution of `state`.
    ///
    /// Non-adaptive requests get the region's current value unchanged.
    pub fn select(&self, state: &mut LoopState, adaptive: bool, rng: &mut SmallRng) -> f64 {
        if self.evaluation {
            state.adaptive = false;
            return state.eval_param.or(self.eval_param).unwrap_or(state.param);
        }

        state.adaptive = adaptive;
        if !adaptive {
            return state.param;
        }

        let param = if state.is_warming_up() {
            self.warmup.sample(rng)
        } else {
            self.strategy.next_param(state, rng)
        };
        state.param = param;
        param
    }

    /// Feed the cost of the execution that just ended into the state machine.
    pub fn record(&self, state: &mut LoopState, cost: f64, rng: &mut SmallRng) -> RecordOutcome {
        if self.evaluation || !state.adaptive {
            return RecordOutcome::Skipped;
        }

        let observed = match &mut state.phase {
            Phase::WarmingUp(obs) => {
                obs.push(state.param, cost);
                obs.retain_latest(self.warmup_history());
                Some(obs.len())
            }
            Phase::Active { .. } => None,
        };

        match observed {
            Some(count) if count >= self.warmup_budget => self.activate(state, count, rng),
            Some(_) => RecordOutcome::Sampled,
            None => {
                self.strategy.observe(state, cost);
                match self.cadence {
                    UpdateCadence::PerExecution => self.update(state),
                    UpdateCadence::PerRun => RecordOutcome::Pending,
                }
            }
        }
    }

    /// End-of-run processing for the per-run cadence.
    pub fn finish_run(&self, state: &mut LoopState) -> RecordOutcome {
        if self.evaluation || self.cadence != UpdateCadence::PerRun || state.is_warming_up() {
            return RecordOutcome::Skipped;
        }
        self.update(state)
    }

    fn activate(&self, state: &mut LoopState, count: usize, rng: &mut SmallRng) -> RecordOutcome {
        match self.strategy.activate(state, rng) {
            Ok(()) => {
                info!(
                    region = %state.id,
                    observations = count,
                    strategy = self.strategy.name(),
                    param = state.param,
                    "warm-up complete"
                );
                RecordOutcome::Activated
            }
            Err(e) => {
                warn!(
                    region = %state.id,
                    observations = count,
                    error = %e,
                    "model fit failed, still warming up"
                );
                RecordOutcome::ActivationFailed(e)
            }
        }
    }

    fn update(&self, state: &mut LoopState) -> RecordOutcome {
        match self.strategy.update(state) {
            Ok(true) => RecordOutcome::Updated,
            Ok(false) => RecordOutcome::Skipped,
            Err(e) => {
                warn!(
                    region = %state.id,
                    iteration = state.iteration,
                    error = %e,
                    "surrogate update failed, skipping cycle"
                );
                RecordOutcome::UpdateFailed(e)
            }
        }
    }
}
