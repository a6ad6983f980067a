//! Mixture-sampling exploitation.
//!
//! A mixture is trained offline: a categorical choice over components followed
//! by a Gaussian draw from the chosen component. Nothing is learned during a run.

use std::path::Path;

use rand::distributions::WeightedIndex;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ExploitationStrategy;
use crate::error::{BoschedError, Result};
use crate::state::{LoopState, Phase, Surrogate};
use crate::surrogate::FitFailure;

/// Persisted form of a [`Mixture`].
#[derive(Clone, Debug, Serialize, Deserialize)]
struct MixtureRecord {
    weights: Vec<f64>,
    means: Vec<f64>,
    stddevs: Vec<f64>,
}

/// Categorical-then-Gaussian sampler with equal-length component lists.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "MixtureRecord", into = "MixtureRecord")]
pub struct Mixture {
    weights: Vec<f64>,
    means: Vec<f64>,
    stddevs: Vec<f64>,
    index: WeightedIndex<f64>,
}

impl Mixture {
    pub fn new(weights: Vec<f64>, means: Vec<f64>, stddevs: Vec<f64>) -> Result<Self> {
        if weights.len() != means.len() || weights.len() != stddevs.len() {
            return Err(BoschedError::InvalidMixture(format!(
                "component lists differ in length: {} weights, {} means, {} stddevs",
                weights.len(),
                means.len(),
                stddevs.len()
            )));
        }
        if let Some(bad) = stddevs.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(BoschedError::InvalidMixture(format!(
                "invalid standard deviation {bad}"
            )));
        }
        if let Some(bad) = means.iter().find(|m| !m.is_finite()) {
            return Err(BoschedError::InvalidMixture(format!("invalid mean {bad}")));
        }
        let index = WeightedIndex::new(&weights)
            .map_err(|e| BoschedError::InvalidMixture(e.to_string()))?;
        Ok(Self {
            weights,
            means,
            stddevs,
            index,
        })
    }

    /// Load a mixture from a JSON file `{ "weights": [..], "means": [..], "stddevs": [..] }`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| BoschedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let record: MixtureRecord =
            serde_json::from_str(&content).map_err(|source| BoschedError::MalformedState {
                path: path.to_path_buf(),
                source,
            })?;
        Self::try_from(record)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Draw one value, clamped to `[lower, 1]`.
    pub fn sample(&self, rng: &mut SmallRng, lower: f64) -> f64 {
        let idx = self.index.sample(rng);
        let mean = self.means[idx];
        let value = Normal::new(mean, self.stddevs[idx])
            .map(|d| d.sample(rng))
            .unwrap_or(mean);
        value.clamp(lower, 1.0)
    }
}

impl PartialEq for Mixture {
    fn eq(&self, other: &Self) -> bool {
        self.weights == other.weights && self.means == other.means && self.stddevs == other.stddevs
    }
}

impl TryFrom<MixtureRecord> for Mixture {
    type Error = BoschedError;

    fn try_from(record: MixtureRecord) -> Result<Self> {
        Self::new(record.weights, record.means, record.stddevs)
    }
}

impl From<Mixture> for MixtureRecord {
    fn from(mixture: Mixture) -> Self {
        Self {
            weights: mixture.weights,
            means: mixture.means,
            stddevs: mixture.stddevs,
        }
    }
}

/// Samples Active regions from their own mixture, or from a global one.
#[derive(Debug, Clone)]
pub struct MixtureSampling {
    global: Option<Mixture>,
    epsilon: f64,
}

impl MixtureSampling {
    pub fn new(global: Option<Mixture>, epsilon: f64) -> Self {
        Self { global, epsilon }
    }

    fn mixture_for<'a>(&'a self, state: &'a LoopState) -> Option<&'a Mixture> {
        state.mixture.as_ref().or(self.global.as_ref())
    }
}

impl ExploitationStrategy for MixtureSampling {
    fn name(&self) -> &'static str {
        "mixture"
    }

    fn activate(
        &self,
        state: &mut LoopState,
        _rng: &mut SmallRng,
    ) -> std::result::Result<(), FitFailure> {
        if self.mixture_for(state).is_none() {
            return Err(FitFailure::Backend(format!(
                "no mixture available for region {}",
                state.id
            )));
        }
        state.phase = Phase::Active {
            surrogate: Surrogate::Absent,
            pending: Vec::new(),
        };
        Ok(())
    }

    fn next_param(&self, state: &mut LoopState, rng: &mut SmallRng) -> f64 {
        match self.mixture_for(state) {
            Some(mixture) => mixture.sample(rng, self.epsilon),
            None => {
                debug!(region = %state.id, "no mixture, keeping parameter");
                state.param
            }
        }
    }

    fn observe(&self, _state: &mut LoopState, _cost: f64) {}

    fn update(&self, _state: &mut LoopState) -> std::result::Result<bool, FitFailure> {
        Ok(false)
    }
}
