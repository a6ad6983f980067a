//! Per-region tuning state.
//!
//! - `RegionId`: identifies one parallel-loop construct across runs
//! - `Observations`: paired (parameter, cost) samples collected during warm-up
//! - `Phase`: warm-up or active, with the surrogate only reachable when active
//! - `LoopState`: everything the engine knows about one region

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::policy::Mixture;
use crate::stats::WorkRecorder;
use crate::surrogate::{Acquisition, SurrogateModel};

/// Stable identifier of a parallel loop region, supplied by the caller.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RegionId {
    fn from(id: u64) -> Self {
        RegionId(id)
    }
}

/// Coarse tuning mode of a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    WarmingUp,
    Active,
}

/// Warm-up samples: control values tried and the per-task cost they produced.
///
/// Both sequences always have the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observations {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Observations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted sequences. Returns `None` if the lengths differ.
    pub fn from_pairs(xs: Vec<f64>, ys: Vec<f64>) -> Option<Self> {
        (xs.len() == ys.len()).then_some(Self { xs, ys })
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.xs.push(x);
        self.ys.push(y);
    }

    /// Drop the oldest pairs so at most `limit` remain.
    pub fn retain_latest(&mut self, limit: usize) {
        let excess = self.xs.len().saturating_sub(limit);
        if excess > 0 {
            self.xs.drain(..excess);
            self.ys.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }
}

/// The model backing an Active region.
///
/// The mixture strategy never builds a per-region model, so an Active region
/// may legitimately hold `Absent`.
#[derive(Debug)]
pub enum Surrogate {
    Absent,
    Present(Box<dyn SurrogateModel>),
}

impl Surrogate {
    pub fn is_present(&self) -> bool {
        matches!(self, Surrogate::Present(_))
    }
}

/// Tuning phase of a region.
///
/// A warming-up region owns raw observations and has no surrogate; an Active
/// region owns its surrogate plus the costs observed since the last update.
#[derive(Debug)]
pub enum Phase {
    WarmingUp(Observations),
    Active {
        surrogate: Surrogate,
        /// Costs observed since the last successful update
        pending: Vec<f64>,
    },
}

impl Default for Phase {
    fn default() -> Self {
        Phase::WarmingUp(Observations::new())
    }
}

/// Everything the engine tracks for one loop region.
#[derive(Debug)]
pub struct LoopState {
    pub id: RegionId,
    /// Control parameter handed out for the current execution
    pub param: f64,
    /// Number of successful model updates
    pub iteration: u64,
    pub phase: Phase,
    /// Start of the execution in flight, if any
    pub last_start: Option<Instant>,
    /// Iterations in the most recent execution
    pub task_count: u64,
    /// Threads in the most recent execution
    pub thread_count: usize,
    /// Frozen value used in evaluation mode
    pub eval_param: Option<f64>,
    /// Per-region mixture for the mixture strategy
    pub mixture: Option<Mixture>,
    /// Acquisition results, one per model update
    pub trace: Vec<Acquisition>,
    /// Whether the last parameter request came from an adaptive schedule
    pub adaptive: bool,
    /// Executions started during this process run
    pub executions: u64,
    /// Per-thread busy time of the execution in flight
    pub work: Option<Arc<WorkRecorder>>,
}

impl LoopState {
    /// A fresh region: warming up, no observations, the given parameter.
    pub fn new(id: RegionId, param: f64) -> Self {
        Self {
            id,
            param,
            iteration: 0,
            phase: Phase::default(),
            last_start: None,
            task_count: 0,
            thread_count: 0,
            eval_param: None,
            mixture: None,
            trace: Vec::new(),
            adaptive: false,
            executions: 0,
            work: None,
        }
    }

    pub fn mode(&self) -> Mode {
        match self.phase {
            Phase::WarmingUp(_) => Mode::WarmingUp,
            Phase::Active { .. } => Mode::Active,
        }
    }

    pub fn is_warming_up(&self) -> bool {
        self.mode() == Mode::WarmingUp
    }

    /// Warm-up observations, or `None` once the region is Active.
    pub fn observations(&self) -> Option<&Observations> {
        match &self.phase {
            Phase::WarmingUp(obs) => Some(obs),
            Phase::Active { .. } => None,
        }
    }

    /// The surrogate, or `None` while warming up.
    pub fn surrogate(&self) -> Option<&Surrogate> {
        match &self.phase {
            Phase::WarmingUp(_) => None,
            Phase::Active { surrogate, .. } => Some(surrogate),
        }
    }

    /// Mark the start of an execution.
    pub fn loop_start(&mut self) -> Instant {
        let now = Instant::now();
        self.last_start = Some(now);
        now
    }

    /// Mark the end of an execution and return its wall time.
    ///
    /// Returns `None` when no execution is in flight.
    pub fn loop_stop(&mut self) -> Option<Duration> {
        self.last_start.take().map(|start| start.elapsed())
    }
}
