//! Online Bayesian optimization against a surrogate model.

use std::sync::Arc;

use rand::rngs::SmallRng;
use tracing::debug;

use super::ExploitationStrategy;
use crate::state::{LoopState, Phase, Surrogate};
use crate::surrogate::{FitFailure, SurrogateBackend};

/// Fits a surrogate when warm-up ends, then refines it after each update.
pub struct OnlineBayesianOptimization {
    backend: Arc<dyn SurrogateBackend>,
    epsilon: f64,
    budget: usize,
}

impl OnlineBayesianOptimization {
    pub fn new(backend: Arc<dyn SurrogateBackend>, epsilon: f64, budget: usize) -> Self {
        Self {
            backend,
            epsilon,
            budget,
        }
    }
}

impl std::fmt::Debug for OnlineBayesianOptimization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnlineBayesianOptimization")
            .field("epsilon", &self.epsilon)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl ExploitationStrategy for OnlineBayesianOptimization {
    fn name(&self) -> &'static str {
        "optimization"
    }

    fn activate(&self, state: &mut LoopState, _rng: &mut SmallRng) -> Result<(), FitFailure> {
        let Some(obs) = state.observations() else {
            return Ok(());
        };
        let mut model = self.backend.fit(obs.xs(), obs.ys())?;
        let acq = model
            .maximize_acquisition(self.epsilon, 0, self.budget)?
            .checked(self.epsilon)?;

        state.phase = Phase::Active {
            surrogate: Surrogate::Present(model),
            pending: Vec::new(),
        };
        state.param = acq.next;
        state.iteration = 1;
        state.trace.push(acq);
        Ok(())
    }

    fn next_param(&self, state: &mut LoopState, _rng: &mut SmallRng) -> f64 {
        state.param
    }

    fn observe(&self, state: &mut LoopState, cost: f64) {
        if let Phase::Active { pending, .. } = &mut state.phase {
            pending.push(cost);
        }
    }

    fn update(&self, state: &mut LoopState) -> Result<bool, FitFailure> {
        let Phase::Active {
            surrogate: Surrogate::Present(model),
            pending,
        } = &mut state.phase
        else {
            return Ok(false);
        };
        if pending.is_empty() {
            return Ok(false);
        }

        let y_avg = pending.iter().sum::<f64>() / pending.len() as f64;
        model.update(state.param, y_avg)?;
        // the model has absorbed these costs even if acquisition fails below
        pending.clear();

        let acq = model
            .maximize_acquisition(self.epsilon, state.iteration, self.budget)?
            .checked(self.epsilon)?;
        debug!(
            region = %state.id,
            previous = state.param,
            next = acq.next,
            mean = acq.mean,
            variance = acq.variance,
            "surrogate updated"
        );
        state.param = acq.next;
        state.iteration += 1;
        state.trace.push(acq);
        Ok(true)
    }
}
