//! Concurrent work distribution.
//!
//! A [`Distributor`] owns one region execution's iteration space and the
//! [`ScheduleParameters`] computed at region entry. Worker threads call
//! [`Distributor::next`] until it returns `None`; every call hands out a
//! disjoint range, and the union of all ranges covers the space exactly once.
//!
//! # Allocation paths
//!
//! - FAC2 and TSS address chunks by index: one `fetch_add` on a chunk counter,
//!   then a closed-form offset.
//! - CSS advances the cursor by a fixed size with `fetch_add` when the cursor
//!   cannot overflow, otherwise by compare-and-swap.
//! - FSS and TAPE size a chunk from the current position and claim it by
//!   compare-and-swap.
//!
//! All of these run under a mutex instead when the cursor is built with
//! [`Cursor::locked`] or the target lacks 64-bit atomics.
//!
//! # Ordered loops
//!
//! Ordered and doacross distributors hand out chunks under a lock so that
//! ticket order equals iteration order. [`Distributor::ordered`] runs a closure
//! in ticket order and [`Distributor::complete`] passes the turn on for chunks
//! without an ordered section.

mod cursor;
mod ordered;

pub use cursor::Cursor;
pub use ordered::OrderedGate;

use parking_lot::Mutex;
use tracing::warn;

use crate::chunk::{Chunking, Schedule, ScheduleParameters};

/// A loop's iteration space `for (i = start; i != end; i += step)` with the
/// usual `<` / `>` bound depending on the sign of `step`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IterationSpace {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl IterationSpace {
    pub fn new(start: i64, end: i64, step: i64) -> Self {
        Self { start, end, step }
    }

    /// `0..n` with step 1.
    ///
    /// Loop values are `i64`, so `n` above `i64::MAX` is truncated to
    /// `0..i64::MAX` with a warning.
    pub fn upto(n: u64) -> Self {
        let end = i64::try_from(n).unwrap_or_else(|_| {
            warn!(requested = n, limit = i64::MAX, "iteration count truncated");
            i64::MAX
        });
        Self::new(0, end, 1)
    }

    /// Number of iterations; zero for empty ranges and a zero step.
    pub fn trip_count(&self) -> u64 {
        let (start, end, step) = (self.start as i128, self.end as i128, self.step as i128);
        let trips = if step > 0 && end > start {
            (end - start + step - 1) / step
        } else if step < 0 && end < start {
            (start - end - step - 1) / -step
        } else {
            0
        };
        trips as u64
    }

    /// Loop value of canonical index `index`, saturated to the `i64` range.
    pub fn value(&self, index: u64) -> i64 {
        let value = self.start as i128 + index as i128 * self.step as i128;
        value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn is_descending(&self) -> bool {
        self.step < 0
    }
}

/// A contiguous range of iterations assigned to one thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// First canonical index
    pub begin: u64,
    /// One past the last canonical index
    pub end: u64,
    /// First loop value
    pub istart: i64,
    /// Loop value bound (exclusive, in the loop's direction)
    pub iend: i64,
    step: i64,
    ticket: Option<u64>,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// `(istart, iend)` as handed to the loop body.
    pub fn bounds(&self) -> (i64, i64) {
        (self.istart, self.iend)
    }

    /// Hand-out ticket, present only for ordered distributors.
    pub fn ticket(&self) -> Option<u64> {
        self.ticket
    }

    /// The loop values of this chunk in iteration order.
    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        let istart = self.istart as i128;
        let step = self.step as i128;
        (0..self.len()).map(move |k| (istart + k as i128 * step) as i64)
    }
}

struct OrderedState {
    /// Next ticket to hand out; held while allocating
    tickets: Mutex<u64>,
    gate: OrderedGate,
}

/// Hands out chunks of one region execution.
pub struct Distributor {
    space: IterationSpace,
    params: ScheduleParameters,
    cursor: Cursor,
    /// CSS may use plain fetch-and-add without overflowing the cursor
    fast_add: bool,
    order: Option<OrderedState>,
}

impl Distributor {
    /// Distributor for `space` under `schedule`, with `param` from the controller.
    pub fn new(schedule: Schedule, param: f64, space: IterationSpace, threads: usize) -> Self {
        let params = ScheduleParameters::compute(schedule, param, space.trip_count(), threads);
        Self::from_parameters(space, params)
    }

    /// Distributor for precomputed parameters. `params.tasks` must equal the
    /// trip count of `space`.
    pub fn from_parameters(space: IterationSpace, params: ScheduleParameters) -> Self {
        let fast_add = match params.chunking {
            Chunking::Fixed { size } => (params.threads + 1)
                .checked_mul(size)
                .and_then(|span| params.tasks.checked_add(span))
                .is_some(),
            _ => false,
        };
        Self {
            space,
            params,
            cursor: Cursor::new(0),
            fast_add,
            order: None,
        }
    }

    /// Ordered distributor over `0..counts[0]` for a doacross loop nest.
    pub fn doacross(schedule: Schedule, param: f64, counts: &[u64], threads: usize) -> Self {
        let outer = counts.first().copied().unwrap_or(0);
        Self::new(schedule, param, IterationSpace::upto(outer), threads).into_ordered()
    }

    /// Switch to ordered hand-out with a FIFO release gate.
    pub fn into_ordered(mut self) -> Self {
        self.order = Some(OrderedState {
            tickets: Mutex::new(0),
            gate: OrderedGate::new(),
        });
        self
    }

    /// Force the mutex-guarded cursor.
    pub fn with_locked_cursor(mut self) -> Self {
        self.cursor = Cursor::locked(self.cursor.load());
        self
    }

    pub fn params(&self) -> &ScheduleParameters {
        &self.params
    }

    pub fn space(&self) -> &IterationSpace {
        &self.space
    }

    pub fn trip_count(&self) -> u64 {
        self.params.tasks
    }

    pub fn is_ordered(&self) -> bool {
        self.order.is_some()
    }

    /// Next chunk for the calling thread, or `None` once the space is exhausted.
    ///
    /// `None` is terminal: the thread is done with this execution.
    pub fn next(&self) -> Option<Chunk> {
        match &self.order {
            Some(order) => {
                let mut tickets = order.tickets.lock();
                let (begin, end) = self.allocate()?;
                let ticket = *tickets;
                *tickets += 1;
                Some(self.chunk(begin, end, Some(ticket)))
            }
            None => {
                let (begin, end) = self.allocate()?;
                Some(self.chunk(begin, end, None))
            }
        }
    }

    /// Run `f` after every earlier chunk has completed its ordered section,
    /// then release the turn. Unordered chunks run `f` directly.
    pub fn ordered<R>(&self, chunk: &Chunk, f: impl FnOnce() -> R) -> R {
        match (&self.order, chunk.ticket) {
            (Some(order), Some(ticket)) => {
                order.gate.wait_turn(ticket);
                let result = f();
                order.gate.release(ticket);
                result
            }
            _ => f(),
        }
    }

    /// Pass the turn on for a chunk that had no ordered section.
    pub fn complete(&self, chunk: &Chunk) {
        if let (Some(order), Some(ticket)) = (&self.order, chunk.ticket) {
            order.gate.wait_turn(ticket);
            order.gate.release(ticket);
        }
    }

    fn chunk(&self, begin: u64, end: u64, ticket: Option<u64>) -> Chunk {
        Chunk {
            begin,
            end,
            istart: self.space.value(begin),
            iend: self.space.value(end),
            step: self.space.step,
            ticket,
        }
    }

    fn allocate(&self) -> Option<(u64, u64)> {
        let tasks = self.params.tasks;
        let threads = self.params.threads;
        if tasks == 0 {
            return None;
        }

        match &self.params.chunking {
            chunking if chunking.is_indexed() => {
                let index = self.cursor.fetch_add(1);
                let (offset, size) = chunking.chunk_at_index(index, threads)?;
                if offset >= tasks as u128 {
                    return None;
                }
                let begin = offset as u64;
                Some((begin, begin.saturating_add(size).min(tasks)))
            }
            Chunking::Fixed { size } if self.fast_add => {
                let begin = self.cursor.fetch_add(*size);
                (begin < tasks).then(|| (begin, (begin + size).min(tasks)))
            }
            chunking => self.cursor.claim(|pos| {
                if pos >= tasks {
                    return None;
                }
                let size = chunking
                    .chunk_at_position(pos, tasks, threads)
                    .unwrap_or(1)
                    .clamp(1, tasks - pos);
                Some(pos + size)
            }),
        }
    }
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("space", &self.space)
            .field("policy", &self.params.policy)
            .field("tasks", &self.params.tasks)
            .field("threads", &self.params.threads)
            .field("ordered", &self.is_ordered())
            .field("atomic", &self.cursor.is_atomic())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Policy;
    use std::sync::Arc;

    #[test]
    fn test_upto_truncates_to_i64_range() {
        assert_eq!(IterationSpace::upto(10).trip_count(), 10);
        let space = IterationSpace::upto(u64::MAX);
        assert_eq!(space.end, i64::MAX);
        assert_eq!(space.trip_count(), i64::MAX as u64);

        let dist = Distributor::doacross(Schedule::baseline(Policy::Css), 0.5, &[u64::MAX], 4);
        assert_eq!(dist.space().trip_count(), i64::MAX as u64);
        assert_eq!(dist.next().map(|c| c.begin), Some(0));
    }

    const POLICIES: [Policy; 5] = [
        Policy::Fac2,
        Policy::Fss,
        Policy::Tss,
        Policy::Css,
        Policy::Tape,
    ];

    fn drain(dist: &Distributor) -> Vec<Chunk> {
        std::iter::from_fn(|| dist.next()).collect()
    }

    fn assert_covers(chunks: &[Chunk], n: u64) {
        let mut ranges: Vec<(u64, u64)> = chunks.iter().map(|c| (c.begin, c.end)).collect();
        ranges.sort_unstable();
        let mut expected = 0;
        for (begin, end) in ranges {
            assert_eq!(begin, expected, "gap or overlap at {begin}");
            assert!(end > begin);
            expected = end;
        }
        assert_eq!(expected, n);
    }

    #[test]
    fn test_trip_count() {
        assert_eq!(IterationSpace::new(0, 10, 1).trip_count(), 10);
        assert_eq!(IterationSpace::new(0, 10, 3).trip_count(), 4);
        assert_eq!(IterationSpace::new(10, 0, -3).trip_count(), 4);
        assert_eq!(IterationSpace::new(5, 5, 1).trip_count(), 0);
        assert_eq!(IterationSpace::new(10, 0, 1).trip_count(), 0);
        assert_eq!(IterationSpace::new(0, 10, 0).trip_count(), 0);
    }

    #[test]
    fn test_single_thread_covers_space() {
        for policy in POLICIES {
            for n in [1, 7, 1000, 4097] {
                let dist =
                    Distributor::new(Schedule::adaptive(policy), 0.5, IterationSpace::upto(n), 4);
                assert_covers(&drain(&dist), n);
                assert!(dist.next().is_none());
            }
        }
    }

    #[test]
    fn test_zero_iterations_yield_no_work() {
        for policy in POLICIES {
            let dist = Distributor::new(
                Schedule::adaptive(policy),
                0.5,
                IterationSpace::new(3, 3, 1),
                4,
            );
            assert!(dist.next().is_none());
        }
    }

    #[test]
    fn test_locked_cursor_covers_space() {
        for policy in POLICIES {
            let dist = Distributor::new(Schedule::baseline(policy), 0.3, IterationSpace::upto(999), 3)
                .with_locked_cursor();
            assert_covers(&drain(&dist), 999);
        }
    }

    #[test]
    fn test_concurrent_threads_cover_space() {
        for policy in POLICIES {
            let dist = Arc::new(Distributor::new(
                Schedule::adaptive(policy),
                0.2,
                IterationSpace::upto(10_000),
                8,
            ));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let dist = Arc::clone(&dist);
                    std::thread::spawn(move || drain(&dist))
                })
                .collect();
            let chunks: Vec<Chunk> = handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect();
            assert_covers(&chunks, 10_000);
        }
    }

    #[test]
    fn test_descending_values() {
        let dist = Distributor::new(
            Schedule::adaptive(Policy::Css),
            1.0,
            IterationSpace::new(10, 0, -2),
            1,
        );
        let chunks = drain(&dist);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].bounds(), (10, 0));
        let values: Vec<i64> = chunks[0].values().collect();
        assert_eq!(values, vec![10, 8, 6, 4, 2]);
    }

    #[test]
    fn test_fss_chunks_stop_at_barriers() {
        let dist = Distributor::new(Schedule::adaptive(Policy::Fss), 0.5, IterationSpace::upto(1000), 4);
        let Chunking::Batched { batches } = dist.params().chunking.clone() else {
            panic!("expected batched chunking");
        };
        for chunk in drain(&dist) {
            let batch = batches
                .iter()
                .find(|b| b.start <= chunk.begin && chunk.begin < b.end)
                .unwrap();
            assert!(chunk.end <= batch.end);
        }
    }

    #[test]
    fn test_ordered_tickets_follow_iteration_order() {
        let dist = Distributor::new(Schedule::adaptive(Policy::Tape), 0.5, IterationSpace::upto(500), 4)
            .into_ordered();
        let chunks = drain(&dist);
        for (i, pair) in chunks.windows(2).enumerate() {
            assert_eq!(pair[0].ticket(), Some(i as u64));
            assert_eq!(pair[0].end, pair[1].begin);
        }
    }

    #[test]
    fn test_ordered_sections_run_in_order() {
        let dist = Arc::new(
            Distributor::new(Schedule::adaptive(Policy::Css), 0.4, IterationSpace::upto(2000), 4)
                .into_ordered(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dist = Arc::clone(&dist);
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    while let Some(chunk) = dist.next() {
                        dist.ordered(&chunk, || seen.lock().push(chunk.begin));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let seen = seen.lock();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.first(), Some(&0));
    }

    #[test]
    fn test_doacross_iterates_outer_dimension() {
        let dist = Distributor::doacross(Schedule::baseline(Policy::Fac2), 0.5, &[64, 8, 8], 4);
        assert!(dist.is_ordered());
        assert_eq!(dist.trip_count(), 64);
        let chunks = drain(&dist);
        for chunk in &chunks {
            dist.complete(chunk);
        }
        assert_covers(&chunks, 64);

        let empty = Distributor::doacross(Schedule::baseline(Policy::Fac2), 0.5, &[], 4);
        assert!(empty.next().is_none());
    }
}
