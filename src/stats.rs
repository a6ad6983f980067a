//! Load-imbalance statistics.
//!
//! [`WorkRecorder`] accumulates per-thread busy time during one region
//! execution using lock-free counters. At region exit the engine turns it into
//! a [`LoopStatistics`] sample and appends it to the region's time series in
//! [`StatisticsLog`]. These metrics are observational only; the controller
//! learns from raw wall time per task.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::state::RegionId;

/// Per-thread busy time for one region execution.
///
/// One slot per participating thread; all operations are lock-free.
#[derive(Debug)]
pub struct WorkRecorder {
    nanos: Vec<AtomicU64>,
}

impl WorkRecorder {
    /// A recorder with `threads` zeroed slots.
    pub fn new(threads: usize) -> Self {
        Self {
            nanos: (0..threads.max(1)).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn threads(&self) -> usize {
        self.nanos.len()
    }

    /// Add `busy` to the slot of thread `slot`. Out-of-range slots are ignored.
    #[inline]
    pub fn record(&self, slot: usize, busy: Duration) {
        if let Some(counter) = self.nanos.get(slot) {
            let nanos = u64::try_from(busy.as_nanos()).unwrap_or(u64::MAX);
            counter.fetch_add(nanos, Ordering::Relaxed);
        }
    }

    /// Time a chunk of work; the elapsed time is recorded when the guard drops.
    pub fn time(&self, slot: usize) -> ChunkTimer<'_> {
        ChunkTimer {
            recorder: self,
            slot,
            start: Instant::now(),
        }
    }

    /// Busy time per thread, in milliseconds.
    pub fn work_per_processor(&self) -> Vec<f64> {
        self.nanos
            .iter()
            .map(|n| n.load(Ordering::Relaxed) as f64 / 1e6)
            .collect()
    }
}

/// Guard returned by [`WorkRecorder::time`].
pub struct ChunkTimer<'a> {
    recorder: &'a WorkRecorder,
    slot: usize,
    start: Instant,
}

impl Drop for ChunkTimer<'_> {
    fn drop(&mut self) {
        self.recorder.record(self.slot, self.start.elapsed());
    }
}

/// Imbalance metrics of one region execution. Times are in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoopStatistics {
    pub parallel_time: f64,
    pub work_time: f64,
    pub performance: f64,
    pub cost: f64,
    pub effectiveness: f64,
    pub coefficient_of_variation: f64,
    pub slowdown: f64,
    pub threads: usize,
}

impl LoopStatistics {
    /// Derive the metrics from region wall time and per-thread busy time.
    ///
    /// `threads` is used for `cost` when no per-thread samples exist.
    pub fn evaluate(parallel_time: f64, threads: usize, work_per_processor: &[f64]) -> Self {
        let threads = if work_per_processor.is_empty() {
            threads
        } else {
            work_per_processor.len()
        };
        let work_time: f64 = work_per_processor.iter().sum();
        let performance = ratio(work_time, parallel_time);
        let cost = parallel_time * threads as f64;
        let effectiveness = ratio(performance, cost);

        let (coefficient_of_variation, slowdown) = if work_per_processor.is_empty() {
            (0.0, 1.0)
        } else {
            let n = work_per_processor.len() as f64;
            let mean = work_time / n;
            if mean <= 0.0 {
                (0.0, 1.0)
            } else {
                let variance = work_per_processor
                    .iter()
                    .map(|w| (w - mean).powi(2))
                    .sum::<f64>()
                    / n;
                let max = work_per_processor
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                (variance.sqrt() / mean, max / mean)
            }
        };

        Self {
            parallel_time,
            work_time,
            performance,
            cost,
            effectiveness,
            coefficient_of_variation,
            slowdown,
            threads,
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Per-region time series of [`LoopStatistics`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatisticsLog {
    regions: BTreeMap<RegionId, Vec<LoopStatistics>>,
}

impl StatisticsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, region: RegionId, sample: LoopStatistics) {
        self.regions.entry(region).or_default().push(sample);
    }

    /// Samples of one region, oldest first.
    pub fn get(&self, region: RegionId) -> &[LoopStatistics] {
        self.regions.get(&region).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Drop the oldest samples of every region so at most `limit` remain.
    pub fn retain_latest(&mut self, limit: usize) {
        for samples in self.regions.values_mut() {
            let excess = samples.len().saturating_sub(limit);
            samples.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_work() {
        let stats = LoopStatistics::evaluate(10.0, 4, &[10.0, 10.0, 10.0, 10.0]);
        assert_eq!(stats.coefficient_of_variation, 0.0);
        assert_eq!(stats.slowdown, 1.0);
        assert_eq!(stats.work_time, 40.0);
        assert_eq!(stats.performance, 4.0);
        assert_eq!(stats.cost, 40.0);
        assert_eq!(stats.effectiveness, 0.1);
    }

    #[test]
    fn test_imbalanced_work() {
        let stats = LoopStatistics::evaluate(20.0, 4, &[5.0, 10.0, 15.0, 20.0]);
        assert!((stats.slowdown - 1.6).abs() < 1e-12);
        // population stddev = sqrt(31.25)
        let expected_cov = 31.25f64.sqrt() / 12.5;
        assert!((stats.coefficient_of_variation - expected_cov).abs() < 1e-12);
    }

    #[test]
    fn test_idle_threads() {
        let stats = LoopStatistics::evaluate(0.0, 2, &[0.0, 0.0]);
        assert_eq!(stats.coefficient_of_variation, 0.0);
        assert_eq!(stats.slowdown, 1.0);
        assert_eq!(stats.performance, 0.0);
        assert_eq!(stats.effectiveness, 0.0);

        let stats = LoopStatistics::evaluate(5.0, 3, &[]);
        assert_eq!(stats.threads, 3);
        assert_eq!(stats.cost, 15.0);
    }

    #[test]
    fn test_recorder_slots() {
        let recorder = WorkRecorder::new(2);
        recorder.record(0, Duration::from_millis(3));
        recorder.record(1, Duration::from_millis(1));
        recorder.record(1, Duration::from_millis(1));
        recorder.record(9, Duration::from_millis(100));
        assert_eq!(recorder.work_per_processor(), vec![3.0, 2.0]);

        {
            let _timer = recorder.time(0);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(recorder.work_per_processor()[0] >= 4.0);
    }

    #[test]
    fn test_log_serializes_by_region() {
        let mut log = StatisticsLog::new();
        log.push(RegionId(7), LoopStatistics::evaluate(1.0, 1, &[1.0]));
        log.push(RegionId(7), LoopStatistics::evaluate(2.0, 1, &[2.0]));
        assert_eq!(log.get(RegionId(7)).len(), 2);
        assert!(log.get(RegionId(8)).is_empty());

        let json = serde_json::to_string(&log).unwrap();
        assert!(json.starts_with("{\"7\":["));
        let back: StatisticsLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_log_retains_latest_samples() {
        let mut log = StatisticsLog::new();
        for i in 0..5 {
            log.push(RegionId(1), LoopStatistics::evaluate(i as f64 + 1.0, 1, &[1.0]));
        }
        log.push(RegionId(2), LoopStatistics::evaluate(1.0, 1, &[1.0]));

        log.retain_latest(3);
        let times: Vec<f64> = log.get(RegionId(1)).iter().map(|s| s.parallel_time).collect();
        assert_eq!(times, vec![3.0, 4.0, 5.0]);
        assert_eq!(log.get(RegionId(2)).len(), 1);
    }
}
