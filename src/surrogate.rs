//! Surrogate-model protocol.
//!
//! The engine does not fit Gaussian processes itself. It drives an external
//! model through two traits: [`SurrogateBackend`] builds or restores models and
//! [`SurrogateModel`] is one region's fitted model. Every fallible call returns
//! a [`FitFailure`] that the controller recovers from locally.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a surrogate could not be built or updated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FitFailure {
    /// The observation covariance matrix is singular.
    #[error("observation covariance is singular")]
    Singular,

    /// The observations cannot support a model (e.g. all inputs identical).
    #[error("degenerate observations: {0}")]
    Degenerate(String),

    /// The backend failed for another reason.
    #[error("surrogate backend error: {0}")]
    Backend(String),
}

/// Result of one acquisition-maximization step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    /// Next control value to try
    pub next: f64,
    /// Predicted mean cost at `next`
    pub mean: f64,
    /// Predicted variance at `next`
    pub variance: f64,
    /// Acquisition function value at `next`
    pub value: f64,
}

impl Acquisition {
    /// Reject results that cannot be used or persisted.
    ///
    /// Every field must be finite and `next` must lie in `[lower, 1]`.
    pub fn checked(self, lower: f64) -> Result<Self, FitFailure> {
        let fields = [self.next, self.mean, self.variance, self.value];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(FitFailure::Degenerate(format!(
                "non-finite acquisition: next={} mean={} variance={} value={}",
                self.next, self.mean, self.variance, self.value
            )));
        }
        if !(lower..=1.0).contains(&self.next) {
            return Err(FitFailure::Degenerate(format!(
                "acquisition point {} outside [{lower}, 1]",
                self.next
            )));
        }
        Ok(self)
    }
}

/// One region's fitted surrogate model.
pub trait SurrogateModel: Send + fmt::Debug {
    /// Incorporate one new observation.
    fn update(&mut self, x: f64, y: f64) -> Result<(), FitFailure>;

    /// Maximize the acquisition function over `[lower, 1]`.
    ///
    /// `iteration` is the number of updates so far (for schedules that anneal
    /// exploration) and `budget` bounds the number of candidate points.
    fn maximize_acquisition(
        &mut self,
        lower: f64,
        iteration: u64,
        budget: usize,
    ) -> Result<Acquisition, FitFailure>;

    /// Serialized form stored in the snapshot.
    fn serialize(&self) -> serde_json::Value;
}

/// Factory for surrogate models.
pub trait SurrogateBackend: Send + Sync {
    /// Fit a new model from paired observations.
    fn fit(&self, xs: &[f64], ys: &[f64]) -> Result<Box<dyn SurrogateModel>, FitFailure>;

    /// Rebuild a model from its serialized form.
    fn restore(&self, value: &serde_json::Value) -> Result<Box<dyn SurrogateModel>, FitFailure>;
}

/// Backend used when no surrogate library is wired in.
///
/// Every fit fails, so regions keep warming up and no tuning history is lost.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl SurrogateBackend for UnavailableBackend {
    fn fit(&self, _xs: &[f64], _ys: &[f64]) -> Result<Box<dyn SurrogateModel>, FitFailure> {
        Err(FitFailure::Backend("no surrogate backend configured".to_string()))
    }

    fn restore(&self, _value: &serde_json::Value) -> Result<Box<dyn SurrogateModel>, FitFailure> {
        Err(FitFailure::Backend("no surrogate backend configured".to_string()))
    }
}
