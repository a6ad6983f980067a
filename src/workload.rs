//! Static workload-parameter tables for non-adaptive policies.
//!
//! The table is loaded once at engine start and read-only afterwards:
//!
//! ```json
//! { "12": { "fss": 0.35, "tape": [1.0, 4.0, 2.5] } }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunk::Policy;
use crate::error::{BoschedError, Result};
use crate::persist::read_json;
use crate::state::RegionId;

/// A precomputed parameter or per-task cost map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkloadEntry {
    Param(f64),
    TaskMap(Vec<f64>),
}

impl WorkloadEntry {
    pub fn as_param(&self) -> Option<f64> {
        match self {
            WorkloadEntry::Param(p) => Some(*p),
            WorkloadEntry::TaskMap(_) => None,
        }
    }

    pub fn as_task_map(&self) -> Option<&[f64]> {
        match self {
            WorkloadEntry::Param(_) => None,
            WorkloadEntry::TaskMap(map) => Some(map),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadTable {
    entries: HashMap<RegionId, HashMap<Policy, WorkloadEntry>>,
}

impl WorkloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table. A missing file is an error: the caller asked for one.
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)?.ok_or_else(|| BoschedError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "workload table not found"),
        })
    }

    pub fn insert(&mut self, region: RegionId, policy: Policy, entry: WorkloadEntry) {
        self.entries.entry(region).or_default().insert(policy, entry);
    }

    pub fn lookup(&self, region: RegionId, policy: Policy) -> Result<&WorkloadEntry> {
        self.entries
            .get(&region)
            .and_then(|by_policy| by_policy.get(&policy))
            .ok_or(BoschedError::MissingWorkload { region, policy })
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
