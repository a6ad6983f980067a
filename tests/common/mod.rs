//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bosched::{
    Acquisition, BoschedConfig, Engine, FitFailure, NoopProfiler, RegionId, SurrogateBackend,
    SurrogateModel,
};
use serde_json::json;

/// Surrogate that proposes the cheapest observation seen so far.
#[derive(Debug, Clone)]
pub struct BestSeenModel {
    xs: Vec<f64>,
    ys: Vec<f64>,
    fail_updates: bool,
    nan_variance: bool,
}

impl BestSeenModel {
    fn best(&self) -> Option<(f64, f64)> {
        self.xs
            .iter()
            .copied()
            .zip(self.ys.iter().copied())
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl SurrogateModel for BestSeenModel {
    fn update(&mut self, x: f64, y: f64) -> Result<(), FitFailure> {
        if self.fail_updates {
            return Err(FitFailure::Singular);
        }
        self.xs.push(x);
        self.ys.push(y);
        Ok(())
    }

    fn maximize_acquisition(
        &mut self,
        lower: f64,
        _iteration: u64,
        _budget: usize,
    ) -> Result<Acquisition, FitFailure> {
        let (x, y) = self
            .best()
            .ok_or_else(|| FitFailure::Degenerate("empty model".to_string()))?;
        Ok(Acquisition {
            next: x.clamp(lower, 1.0),
            mean: y,
            variance: if self.nan_variance {
                f64::NAN
            } else {
                1.0 / self.xs.len() as f64
            },
            value: -y,
        })
    }

    fn serialize(&self) -> serde_json::Value {
        json!({ "xs": self.xs, "ys": self.ys })
    }
}

/// Backend for [`BestSeenModel`] that counts fits and can be told to fail.
#[derive(Debug, Default)]
pub struct MockBackend {
    pub fail_fit: bool,
    pub fail_updates: bool,
    pub nan_variance: bool,
    pub fits: AtomicUsize,
}

impl MockBackend {
    pub fn failing() -> Self {
        Self {
            fail_fit: true,
            ..Default::default()
        }
    }

    /// Models whose predictions carry a NaN variance.
    pub fn nan_variance() -> Self {
        Self {
            nan_variance: true,
            ..Default::default()
        }
    }

    pub fn fit_count(&self) -> usize {
        self.fits.load(Ordering::Relaxed)
    }
}

impl SurrogateBackend for MockBackend {
    fn fit(&self, xs: &[f64], ys: &[f64]) -> Result<Box<dyn SurrogateModel>, FitFailure> {
        self.fits.fetch_add(1, Ordering::Relaxed);
        if self.fail_fit {
            return Err(FitFailure::Singular);
        }
        Ok(Box::new(BestSeenModel {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            fail_updates: self.fail_updates,
            nan_variance: self.nan_variance,
        }))
    }

    fn restore(&self, value: &serde_json::Value) -> Result<Box<dyn SurrogateModel>, FitFailure> {
        let xs: Vec<f64> = serde_json::from_value(value["xs"].clone())
            .map_err(|e| FitFailure::Backend(e.to_string()))?;
        let ys: Vec<f64> = serde_json::from_value(value["ys"].clone())
            .map_err(|e| FitFailure::Backend(e.to_string()))?;
        Ok(Box::new(BestSeenModel {
            xs,
            ys,
            fail_updates: self.fail_updates,
            nan_variance: self.nan_variance,
        }))
    }
}

/// Configuration rooted in `dir` with a small warm-up budget.
pub fn config(dir: &Path, warmup_budget: usize) -> BoschedConfig {
    BoschedConfig {
        program: "itest".to_string(),
        state_dir: dir.to_path_buf(),
        warmup_budget,
        seed: Some(2024),
        ..Default::default()
    }
}

/// Start an engine, as a new process run would.
pub fn start(config: BoschedConfig, backend: Arc<MockBackend>) -> Engine {
    Engine::with_components(config, backend, Box::new(NoopProfiler))
        .expect("engine should start")
}

/// One execution of `region` whose cost is smallest near `0.3`.
pub fn execute(engine: &Engine, region: RegionId) -> f64 {
    let param = engine.schedule_parameter(region, true);
    engine.schedule_begin(region, 1, 1);
    let spin = std::time::Duration::from_micros((200.0 + 2000.0 * (param - 0.3).abs()) as u64);
    let start = std::time::Instant::now();
    while start.elapsed() < spin {
        std::hint::spin_loop();
    }
    engine.schedule_end(region);
    param
}
