//! Rayon-backed thread team that drives regions through the engine.
//!
//! The engine only implements the hook contract. `ThreadTeam` plays the host
//! runtime: the calling thread opens the region, every pool thread pulls
//! chunks until the distributor runs dry, and the calling thread closes the
//! region once all of them have returned.

use std::sync::Arc;

use tracing::debug;

use crate::chunk::Schedule;
use crate::distributor::{Chunk, Distributor, IterationSpace};
use crate::engine::Engine;
use crate::error::Result;
use crate::state::RegionId;
use crate::stats::WorkRecorder;

/// A fixed set of worker threads executing parallel loops.
pub struct ThreadTeam {
    pool: rayon::ThreadPool,
    prefix: Arc<str>,
}

impl ThreadTeam {
    /// Build a team of `threads` workers named `{prefix}-team-NNNN`.
    pub fn new(prefix: &str, threads: usize) -> Result<Self> {
        let prefix: Arc<str> = Arc::from(prefix);
        let name_prefix = Arc::clone(&prefix);
        let start_prefix = Arc::clone(&prefix);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("{}-team-{:04}", name_prefix, i))
            .start_handler(move |thread_index| {
                debug!(thread_index, %start_prefix, "team thread starting");
            })
            .build()?;
        Ok(Self { pool, prefix })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Execute one region: `body` runs once per chunk on whichever thread
    /// claimed it.
    pub fn run<F>(
        &self,
        engine: &Engine,
        region: RegionId,
        schedule: Schedule,
        space: IterationSpace,
        body: F,
    ) where
        F: Fn(&Chunk) + Sync,
    {
        let distributor = engine.open_region(region, schedule, space, self.threads());
        self.drive(engine, region, &distributor, body);
    }

    /// Execute one ordered region: `body` runs in parallel, then `ordered`
    /// receives its result strictly in iteration order.
    pub fn run_ordered<F, G, R>(
        &self,
        engine: &Engine,
        region: RegionId,
        schedule: Schedule,
        space: IterationSpace,
        body: F,
        ordered: G,
    ) where
        F: Fn(&Chunk) -> R + Sync,
        G: Fn(&Chunk, R) + Sync,
    {
        let distributor = engine
            .open_region(region, schedule, space, self.threads())
            .into_ordered();
        self.drive_ordered(engine, region, &distributor, body, ordered);
    }

    /// Execute a doacross nest over the outermost of `counts`.
    pub fn run_doacross<F, G, R>(
        &self,
        engine: &Engine,
        region: RegionId,
        schedule: Schedule,
        counts: &[u64],
        body: F,
        ordered: G,
    ) where
        F: Fn(&Chunk) -> R + Sync,
        G: Fn(&Chunk, R) + Sync,
    {
        let threads = self.threads();
        let param = engine.schedule_parameter(region, schedule.is_adaptive());
        engine.schedule_begin(region, counts.first().copied().unwrap_or(0), threads);
        let distributor = Distributor::doacross(schedule, param, counts, threads);
        self.drive_ordered(engine, region, &distributor, body, ordered);
    }

    fn drive_ordered<F, G, R>(
        &self,
        engine: &Engine,
        region: RegionId,
        distributor: &Distributor,
        body: F,
        ordered: G,
    ) where
        F: Fn(&Chunk) -> R + Sync,
        G: Fn(&Chunk, R) + Sync,
    {
        self.drive(engine, region, distributor, |chunk| {
            let result = body(chunk);
            distributor.ordered(chunk, || ordered(chunk, result));
        });
    }

    fn drive<F>(&self, engine: &Engine, region: RegionId, distributor: &Distributor, per_chunk: F)
    where
        F: Fn(&Chunk) + Sync,
    {
        let recorder: Option<Arc<WorkRecorder>> = engine.work_recorder(region);
        let profiled = engine.profile_start(region);
        self.pool.broadcast(|ctx| {
            let slot = ctx.index();
            while let Some(chunk) = distributor.next() {
                let _timer = recorder.as_ref().map(|r| r.time(slot));
                per_chunk(&chunk);
            }
        });
        if profiled {
            engine.profile_stop();
        }
        engine.schedule_end(region);
    }
}

impl std::fmt::Debug for ThreadTeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTeam")
            .field("prefix", &self.prefix)
            .field("threads", &self.threads())
            .finish()
    }
}
