//! Process-wide table of per-region tuning state.
//!
//! ```text
//! LoopRegistry
//!   └── RwLock<HashMap<RegionId, LoopHandle>>
//!         └── Arc<Mutex<LoopState>>
//! ```
//!
//! Entries are created lazily on first reference and live for the rest of the
//! process. The map lock is only taken for writing on first touch of a region;
//! the per-entry mutex is uncontended because the host runtime serializes
//! work-share setup and teardown of a region onto one thread.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::state::{LoopState, RegionId};

/// Shared handle to one region's state.
pub type LoopHandle = Arc<Mutex<LoopState>>;

/// Registry of per-region state.
pub struct LoopRegistry {
    loops: RwLock<HashMap<RegionId, LoopHandle>>,
    default_param: f64,
}

impl LoopRegistry {
    /// Create an empty registry whose new regions start at `default_param`.
    pub fn new(default_param: f64) -> Self {
        Self {
            loops: RwLock::new(HashMap::new()),
            default_param,
        }
    }

    /// Create a registry pre-populated with restored states.
    pub fn from_states(states: impl IntoIterator<Item = LoopState>, default_param: f64) -> Self {
        let loops = states
            .into_iter()
            .map(|state| (state.id, Arc::new(Mutex::new(state))))
            .collect();
        Self {
            loops: RwLock::new(loops),
            default_param,
        }
    }

    /// Look up a region without creating it.
    pub fn get(&self, id: RegionId) -> Option<LoopHandle> {
        self.loops.read().get(&id).cloned()
    }

    /// Get or create the state of a region.
    ///
    /// The first call for a given id creates a warming-up entry (slow path with
    /// write lock). Subsequent calls use the fast path (read lock only). Two
    /// threads racing on the same new id observe the same entry.
    pub fn get_or_create(&self, id: RegionId) -> LoopHandle {
        // Fast path: read lock
        if let Some(handle) = self.loops.read().get(&id) {
            return Arc::clone(handle);
        }

        // Slow path: write lock, re-checked through the entry API
        let mut loops = self.loops.write();
        let default_param = self.default_param;
        Arc::clone(
            loops
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(LoopState::new(id, default_param)))),
        )
    }

    /// All regions, ordered by id, for bulk end-of-run processing.
    pub fn all(&self) -> Vec<(RegionId, LoopHandle)> {
        let mut entries: Vec<_> = self
            .loops
            .read()
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    pub fn len(&self) -> usize {
        self.loops.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.read().is_empty()
    }

    pub fn default_param(&self) -> f64 {
        self.default_param
    }
}

impl std::fmt::Debug for LoopRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopRegistry")
            .field("loops", &self.len())
            .field("default_param", &self.default_param)
            .finish()
    }
}
