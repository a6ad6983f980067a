//! Profiling bracket hooks.
//!
//! The engine does not capture profiles itself. It brackets the first few
//! executions of each region and delegates capture to a [`Profiler`].

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::info;

use crate::state::RegionId;

/// External profiler driven by the bracket hooks.
pub trait Profiler: Send + Sync {
    fn start(&self, region: RegionId, execution: u64);
    fn stop(&self, region: RegionId);
}

/// Profiler that ignores every bracket.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn start(&self, _region: RegionId, _execution: u64) {}
    fn stop(&self, _region: RegionId) {}
}

/// Profiler that logs bracket wall time through `tracing`.
#[derive(Debug, Default)]
pub struct TracingProfiler {
    open: Mutex<HashMap<RegionId, (u64, Instant)>>,
}

impl TracingProfiler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Profiler for TracingProfiler {
    fn start(&self, region: RegionId, execution: u64) {
        self.open.lock().insert(region, (execution, Instant::now()));
    }

    fn stop(&self, region: RegionId) {
        if let Some((execution, start)) = self.open.lock().remove(&region) {
            info!(
                region = %region,
                execution,
                elapsed_us = start.elapsed().as_micros() as u64,
                "profiled execution"
            );
        }
    }
}

/// Bounds profiling to the first `limit` executions of each region and
/// remembers which region is currently bracketed.
pub struct ProfileBracket {
    profiler: Box<dyn Profiler>,
    limit: u64,
    enabled: bool,
    active: Mutex<Option<RegionId>>,
}

impl ProfileBracket {
    pub fn new(profiler: Box<dyn Profiler>, enabled: bool, limit: u64) -> Self {
        Self {
            profiler,
            limit,
            enabled,
            active: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Box::new(NoopProfiler), false, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Open a bracket for `execution` of `region`. Returns whether capture started.
    pub fn start(&self, region: RegionId, execution: u64) -> bool {
        if !self.enabled || execution >= self.limit {
            return false;
        }
        let mut active = self.active.lock();
        if let Some(previous) = active.replace(region) {
            self.profiler.stop(previous);
        }
        self.profiler.start(region, execution);
        true
    }

    /// Close the open bracket. Returns whether one was open.
    pub fn stop(&self) -> bool {
        match self.active.lock().take() {
            Some(region) => {
                self.profiler.stop(region);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for ProfileBracket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileBracket")
            .field("enabled", &self.enabled)
            .field("limit", &self.limit)
            .field("active", &*self.active.lock())
            .finish()
    }
}
