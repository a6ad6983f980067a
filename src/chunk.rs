//! Closed-form chunking for the self-scheduling policies.
//!
//! Every function here is pure: given the control parameter, the number of
//! iterations `N` and the number of threads `P`, it fixes how the iteration
//! space is cut into chunks. The distributor consumes the result.
//!
//! | Policy | Chunk sequence |
//! |--------|----------------|
//! | FAC2 | batches of `P` chunks, each batch handing out half the remaining work |
//! | FSS | batches of `P` chunks of size `F`, `F` recomputed at every barrier |
//! | TSS | linearly decreasing chunks from `f` down to 1 |
//! | CSS | one fixed chunk size |
//! | TAPE | taper rule on the remaining work |
//!
//! Chunk sizes are floored and never zero.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Shape factor of the non-adaptive TAPE baseline.
pub const TAPE_BASELINE_SHAPE: f64 = 3.0;

/// FSS batch tables stop refining after this many barriers.
const MAX_BATCHES: usize = 1 << 16;

/// A self-scheduling policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Batched factoring with factor 2
    Fac2,
    /// Fixed-size (fair) self-scheduling
    Fss,
    /// Trapezoid self-scheduling
    Tss,
    /// Chunk self-scheduling
    Css,
    /// Taper scheduling
    Tape,
}

impl Policy {
    /// Whether the policy consumes a control parameter at all.
    pub fn is_parameterized(self) -> bool {
        !matches!(self, Policy::Fac2)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Fac2 => "FAC2",
            Policy::Fss => "FSS",
            Policy::Tss => "TSS",
            Policy::Css => "CSS",
            Policy::Tape => "TAPE",
        };
        f.write_str(name)
    }
}

/// Whether a policy runs with its fixed textbook parameter or a tuned one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    Baseline,
    Adaptive,
}

/// A policy together with its variant, as selected by the host runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Schedule {
    pub policy: Policy,
    pub variant: Variant,
}

impl Schedule {
    pub fn baseline(policy: Policy) -> Self {
        Self {
            policy,
            variant: Variant::Baseline,
        }
    }

    pub fn adaptive(policy: Policy) -> Self {
        Self {
            policy,
            variant: Variant::Adaptive,
        }
    }

    /// Whether executions of this schedule feed the tuner.
    pub fn is_adaptive(&self) -> bool {
        self.variant == Variant::Adaptive && self.policy.is_parameterized()
    }

    /// Whether the schedule asks the controller for a parameter.
    pub fn is_parameterized(&self) -> bool {
        self.policy.is_parameterized()
    }
}

/// One FSS batch: `[start, end)` in canonical iteration indices, cut into
/// chunks of `chunk`. `end` is the barrier position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch {
    pub start: u64,
    pub end: u64,
    pub chunk: u64,
}

/// How a policy cuts the iteration space.
#[derive(Clone, Debug, PartialEq)]
pub enum Chunking {
    /// FAC2; `first` is the per-thread share `N / P`
    Factoring { first: u64 },
    /// TSS; `first` decreases to 1 over `steps` chunks
    Trapezoid { first: u64, steps: u64 },
    /// CSS
    Fixed { size: u64 },
    /// FSS, one entry per barrier
    Batched { batches: Vec<Batch> },
    /// TAPE with the given shape value
    Taper { shape: f64 },
}

impl Chunking {
    /// Whether chunks are addressed by their index rather than by position.
    pub fn is_indexed(&self) -> bool {
        matches!(self, Chunking::Factoring { .. } | Chunking::Trapezoid { .. })
    }

    /// Start offset and size of chunk number `index` for index-addressed policies.
    ///
    /// Returns `None` for position-addressed policies.
    pub fn chunk_at_index(&self, index: u64, threads: u64) -> Option<(u128, u64)> {
        match *self {
            Chunking::Factoring { first } => Some(factoring_chunk(first, threads, index)),
            Chunking::Trapezoid { first, steps } => Some((
                trapezoid_offset(first, steps, index),
                trapezoid_size(first, steps, index),
            )),
            _ => None,
        }
    }

    /// Size of the chunk starting at canonical position `pos`, before clipping
    /// to the end of the iteration space.
    ///
    /// Returns `None` for index-addressed policies.
    pub fn chunk_at_position(&self, pos: u64, tasks: u64, threads: u64) -> Option<u64> {
        match self {
            Chunking::Fixed { size } => Some(*size),
            Chunking::Batched { batches } => {
                let idx = batches.partition_point(|b| b.end <= pos);
                Some(
                    batches
                        .get(idx)
                        .map(|b| b.chunk.min(b.end - pos).max(1))
                        .unwrap_or(1),
                )
            }
            Chunking::Taper { shape } => {
                Some(taper_chunk(tasks.saturating_sub(pos), threads, *shape))
            }
            _ => None,
        }
    }
}

/// Output of a chunk algorithm for one region execution.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleParameters {
    pub policy: Policy,
    /// Iterations in this execution
    pub tasks: u64,
    /// Threads sharing the work (at least 1)
    pub threads: u64,
    /// Parameter after the policy's domain transform
    pub param: f64,
    pub chunking: Chunking,
}

impl ScheduleParameters {
    /// Run the chunk algorithm of `schedule` for one execution.
    pub fn compute(schedule: Schedule, param: f64, tasks: u64, threads: usize) -> Self {
        let threads = threads.max(1) as u64;
        let param = sanitize(param);
        let adaptive = schedule.variant == Variant::Adaptive;

        let (param, chunking) = match schedule.policy {
            Policy::Fac2 => (
                param,
                Chunking::Factoring {
                    first: tasks / threads,
                },
            ),
            Policy::Tape => {
                let shape = if adaptive {
                    tape_transform(param)
                } else {
                    TAPE_BASELINE_SHAPE
                };
                (shape, Chunking::Taper { shape })
            }
            Policy::Tss => {
                let shape = if adaptive {
                    param
                } else {
                    tss_baseline_shape(tasks, threads)
                };
                let first = tss_first_chunk(shape, tasks);
                let steps = tss_steps(first, tasks);
                (shape, Chunking::Trapezoid { first, steps })
            }
            Policy::Fss => {
                let param = fss_transform(param);
                (
                    param,
                    Chunking::Batched {
                        batches: fss_batches(param, tasks, threads),
                    },
                )
            }
            Policy::Css => {
                let param = css_transform(param);
                (
                    param,
                    Chunking::Fixed {
                        size: css_chunk_size(param, tasks, threads),
                    },
                )
            }
        };

        Self {
            policy: schedule.policy,
            tasks,
            threads,
            param,
            chunking,
        }
    }

    /// Size of the first chunk handed out.
    pub fn initial_chunk(&self) -> u64 {
        match &self.chunking {
            Chunking::Factoring { first } => factoring_size(*first, 0),
            Chunking::Trapezoid { first, .. } => *first,
            Chunking::Fixed { size } => *size,
            Chunking::Batched { batches } => batches.first().map(|b| b.chunk).unwrap_or(1),
            Chunking::Taper { shape } => taper_chunk(self.tasks, self.threads, *shape),
        }
    }
}

/// Clamp a controller value into `[0, 1]`; non-finite values map to the midpoint.
fn sanitize(param: f64) -> f64 {
    if param.is_finite() {
        param.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

/// Map a controller value onto the TAPE shape range `[0, 6]`.
pub fn tape_transform(param: f64) -> f64 {
    6.0 * param
}

/// Map a controller value log-uniformly onto `[1e-3, 1e3]`.
pub fn fss_transform(param: f64) -> f64 {
    10f64.powf(6.0 * param - 3.0)
}

/// Map a controller value log-uniformly onto `[1e-3, 1]` (fraction of `N / P`).
pub fn css_transform(param: f64) -> f64 {
    10f64.powf(3.0 * (param - 1.0))
}

/// CSS chunk size: the given fraction of each thread's even share.
pub fn css_chunk_size(param: f64, tasks: u64, threads: u64) -> u64 {
    let size = (param * tasks as f64 / threads.max(1) as f64).floor();
    if size.is_finite() && size >= 1.0 {
        size as u64
    } else {
        1
    }
}

/// Trapezoid shape that makes the first chunk `N / (2P + 1)`.
fn tss_baseline_shape(tasks: u64, threads: u64) -> f64 {
    if tasks == 0 {
        return f64::INFINITY;
    }
    let t = tasks as f64 / (2 * threads + 1) as f64;
    (2 * tasks) as f64 / (t * t)
}

/// `floor(sqrt(2N / shape) - 1)`, kept within `[1, N]`.
fn tss_first_chunk(shape: f64, tasks: u64) -> u64 {
    if tasks == 0 {
        return 1;
    }
    let raw = (2.0 * tasks as f64 / shape).sqrt() - 1.0;
    if raw.is_nan() {
        return 1;
    }
    let raw = raw.floor().max(1.0);
    if raw >= tasks as f64 {
        tasks
    } else {
        raw as u64
    }
}

/// Number of chunks from `first` down to 1 covering `N`: `ceil(2N / (first + 1))`.
fn tss_steps(first: u64, tasks: u64) -> u64 {
    let denom = first as u128 + 1;
    (((2 * tasks as u128) + denom - 1) / denom).max(1) as u64
}

fn trapezoid_size(first: u64, steps: u64, index: u64) -> u64 {
    if index >= steps {
        1
    } else if steps <= 1 {
        first
    } else {
        let decrement = index as u128 * (first - 1) as u128 / (steps - 1) as u128;
        first - decrement as u64
    }
}

fn trapezoid_offset(first: u64, steps: u64, index: u64) -> u128 {
    let within = index.min(steps) as u128;
    let decrements = if steps <= 1 {
        0
    } else {
        floor_sum(within, (steps - 1) as u128, (first - 1) as u128, 0)
    };
    within * first as u128 - decrements + (index as u128 - within)
}

/// `sum_{i=0}^{n-1} floor((a*i + b) / m)` in `O(log m)`.
fn floor_sum(mut n: u128, mut m: u128, mut a: u128, mut b: u128) -> u128 {
    let mut sum = 0;
    loop {
        if a >= m {
            sum += n * n.saturating_sub(1) / 2 * (a / m);
            a %= m;
        }
        if b >= m {
            sum += n * (b / m);
            b %= m;
        }
        let y_max = a * n + b;
        if y_max < m {
            break;
        }
        n = y_max / m;
        b = y_max % m;
        std::mem::swap(&mut m, &mut a);
    }
    sum
}

fn factoring_size(first: u64, batch: u64) -> u64 {
    if batch >= 63 {
        1
    } else {
        (first >> (batch + 1)).max(1)
    }
}

fn factoring_chunk(first: u64, threads: u64, index: u64) -> (u128, u64) {
    let threads = threads.max(1);
    let mut offset: u128 = 0;
    let mut index = index;
    let mut batch = 0;
    loop {
        let size = factoring_size(first, batch);
        if size == 1 {
            return (offset + index as u128, 1);
        }
        if index < threads {
            return (offset + index as u128 * size as u128, size);
        }
        offset += threads as u128 * size as u128;
        index -= threads;
        batch += 1;
    }
}

/// FSS batch table; each barrier re-evaluates `x` on the remaining work.
fn fss_batches(param: f64, tasks: u64, threads: u64) -> Vec<Batch> {
    let b = threads as f64 / 2.0 * param;
    let mut batches = Vec::new();
    let mut start = 0u64;

    while start < tasks {
        let remaining = tasks - start;
        let r = remaining as f64;
        let b2 = b * b / r;
        let x = 1.0 + b2 + (b2 * (b2 + 2.0)).sqrt();
        let f = ((r / x) / threads as f64).floor();
        let chunk = if f.is_finite() && f >= 1.0 { f as u64 } else { 1 };

        let len = if chunk == 1 || batches.len() + 1 >= MAX_BATCHES {
            remaining
        } else {
            chunk.saturating_mul(threads).min(remaining)
        };
        batches.push(Batch {
            start,
            end: start + len,
            chunk,
        });
        start += len;
    }
    batches
}

/// TAPE: `max(1, ceil(R/P + v²/2 - v·sqrt(2R/P + v²/4)))`, at most `R`.
pub fn taper_chunk(remaining: u64, threads: u64, shape: f64) -> u64 {
    let per_thread = remaining as f64 / threads.max(1) as f64;
    let t = per_thread + shape * shape / 2.0
        - shape * (2.0 * per_thread + shape * shape / 4.0).sqrt();
    let c = t.ceil();
    if c.is_finite() && c >= 1.0 {
        (c as u64).min(remaining.max(1))
    } else {
        1
    }
}
