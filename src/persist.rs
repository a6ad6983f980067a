//! Durable tuning state.
//!
//! The snapshot is a single JSON document rewritten as a whole at shutdown:
//!
//! ```json
//! {
//!   "date": "2024-05-01T12:00:00Z",
//!   "iteration": 3,
//!   "num_loop": 2,
//!   "loops": [
//!     { "id": 1, "param": 0.41, "warmup": true, "iteration": 0,
//!       "obs_x": [0.41], "obs_y": [0.02] },
//!     { "id": 2, "param": 0.17, "warmup": false, "iteration": 5, "gp": { ... } }
//!   ]
//! }
//! ```
//!
//! Warming-up regions persist raw observations; Active regions persist the
//! serialized surrogate instead. A missing file means "first run". A file that
//! exists but does not parse is an error.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BoschedError, Result};
use crate::policy::Mixture;
use crate::registry::LoopRegistry;
use crate::state::{LoopState, Observations, Phase, RegionId, Surrogate};
use crate::surrogate::{Acquisition, SurrogateBackend};

/// Persisted form of one region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoopRecord {
    pub id: RegionId,
    pub param: f64,
    pub warmup: bool,
    pub iteration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs_x: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs_y: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gp: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<Acquisition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixture: Option<Mixture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_param: Option<f64>,
}

impl LoopRecord {
    pub fn from_state(state: &LoopState) -> Self {
        let (warmup, obs_x, obs_y, gp) = match &state.phase {
            Phase::WarmingUp(obs) => (
                true,
                Some(obs.xs().to_vec()),
                Some(obs.ys().to_vec()),
                None,
            ),
            Phase::Active { surrogate, .. } => {
                let gp = match surrogate {
                    Surrogate::Present(model) => Some(model.serialize()),
                    Surrogate::Absent => None,
                };
                (false, None, None, gp)
            }
        };
        Self {
            id: state.id,
            param: state.param,
            warmup,
            iteration: state.iteration,
            obs_x,
            obs_y,
            gp,
            trace: state.trace.clone(),
            mixture: state.mixture.clone(),
            eval_param: state.eval_param,
        }
    }

    /// Rebuild the in-memory state, restoring the surrogate through `backend`.
    pub fn into_state(self, backend: &dyn SurrogateBackend) -> Result<LoopState> {
        let phase = if self.warmup {
            let xs = self.obs_x.unwrap_or_default();
            let ys = self.obs_y.unwrap_or_default();
            let (nx, ny) = (xs.len(), ys.len());
            let obs = Observations::from_pairs(xs, ys).ok_or_else(|| BoschedError::CorruptRecord {
                region: self.id,
                reason: format!("obs_x has {nx} values but obs_y has {ny}"),
            })?;
            Phase::WarmingUp(obs)
        } else {
            let surrogate = match &self.gp {
                Some(value) => Surrogate::Present(backend.restore(value).map_err(|source| {
                    BoschedError::Restore {
                        region: self.id,
                        source,
                    }
                })?),
                None => Surrogate::Absent,
            };
            Phase::Active {
                surrogate,
                pending: Vec::new(),
            }
        };

        let mut state = LoopState::new(self.id, self.param);
        state.iteration = self.iteration;
        state.phase = phase;
        state.trace = self.trace;
        state.mixture = self.mixture;
        state.eval_param = self.eval_param;
        Ok(state)
    }
}

/// Whole-file snapshot of the loop registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: DateTime<Utc>,
    /// Number of process runs that stored this snapshot
    pub iteration: u64,
    #[serde(default)]
    pub num_loop: usize,
    #[serde(default)]
    pub loops: Vec<LoopRecord>,
}

impl Snapshot {
    /// Capture every region of `registry`, stamped with the current time.
    pub fn capture(registry: &LoopRegistry, iteration: u64) -> Self {
        let loops: Vec<LoopRecord> = registry
            .all()
            .iter()
            .map(|(_, handle)| LoopRecord::from_state(&handle.lock()))
            .collect();
        Self {
            date: Utc::now(),
            iteration,
            num_loop: loops.len(),
            loops,
        }
    }

    /// Rebuild every region's state.
    pub fn into_states(self, backend: &dyn SurrogateBackend) -> Result<Vec<LoopState>> {
        self.loops
            .into_iter()
            .map(|record| record.into_state(backend))
            .collect()
    }

    /// Read a snapshot. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        read_json(path)
    }

    /// Replace the snapshot at `path`.
    pub fn store(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

/// Read a JSON document. `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(BoschedError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| BoschedError::MalformedState {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a JSON document by writing a sibling temp file and renaming it over
/// `path`, so readers never observe a partial file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).map_err(BoschedError::Serialize)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    }
    let tmp = temp_path(path);
    std::fs::write(&tmp, content).map_err(io_error(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_error(path))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> BoschedError {
    let path = path.to_path_buf();
    move |source| BoschedError::Io { path, source }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Mode;
    use crate::surrogate::testing::BestSeenBackend;

    fn warming(id: u64, xs: &[f64], ys: &[f64]) -> LoopState {
        let mut state = LoopState::new(RegionId(id), *xs.last().unwrap_or(&0.5));
        state.phase = Phase::WarmingUp(Observations::from_pairs(xs.to_vec(), ys.to_vec()).unwrap());
        state
    }

    fn active(id: u64) -> LoopState {
        let backend = BestSeenBackend::default();
        let mut state = LoopState::new(RegionId(id), 0.3);
        state.iteration = 4;
        state.phase = Phase::Active {
            surrogate: Surrogate::Present(backend.fit(&[0.3, 0.6], &[1.0, 2.0]).unwrap()),
            pending: vec![7.0],
        };
        state
    }

    #[test]
    fn test_missing_file_is_first_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Snapshot::load(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Snapshot::load(&path),
            Err(BoschedError::MalformedState { .. })
        ));
    }

    #[test]
    fn test_mismatched_observations_are_rejected() {
        let record = LoopRecord {
            id: RegionId(3),
            param: 0.5,
            warmup: true,
            iteration: 0,
            obs_x: Some(vec![0.1, 0.2]),
            obs_y: Some(vec![1.0]),
            gp: None,
            trace: Vec::new(),
            mixture: None,
            eval_param: None,
        };
        assert!(matches!(
            record.into_state(&BestSeenBackend::default()),
            Err(BoschedError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_record_shape() {
        let record = LoopRecord::from_state(&warming(1, &[0.2], &[3.0]));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["warmup"], true);
        assert_eq!(json["obs_x"], serde_json::json!([0.2]));
        assert!(json.get("gp").is_none());

        let record = LoopRecord::from_state(&active(2));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["warmup"], false);
        assert!(json.get("obs_x").is_none());
        assert_eq!(json["gp"]["xs"], serde_json::json!([0.3, 0.6]));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join(".bostate.test.json");
        let registry = LoopRegistry::from_states(
            [warming(1, &[0.2, 0.9], &[3.0, 4.0]), active(2)],
            0.5,
        );

        Snapshot::capture(&registry, 7).store(&path).unwrap();
        assert!(!temp_path(&path).exists());

        let snapshot = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(snapshot.iteration, 7);
        assert_eq!(snapshot.num_loop, 2);

        let states = snapshot.into_states(&BestSeenBackend::default()).unwrap();
        let warm = &states[0];
        assert_eq!(warm.mode(), Mode::WarmingUp);
        assert_eq!(warm.param, 0.9);
        assert_eq!(warm.observations().unwrap().xs(), &[0.2, 0.9]);
        assert_eq!(warm.observations().unwrap().ys(), &[3.0, 4.0]);

        let act = &states[1];
        assert_eq!(act.mode(), Mode::Active);
        assert_eq!(act.param, 0.3);
        assert_eq!(act.iteration, 4);
        assert!(act.surrogate().unwrap().is_present());
    }

    #[test]
    fn test_restore_failure_is_reported() {
        let record = LoopRecord::from_state(&active(5));
        let backend = BestSeenBackend {
            fail_fit: true,
            ..Default::default()
        };
        assert!(matches!(
            record.into_state(&backend),
            Err(BoschedError::Restore { region: RegionId(5), .. })
        ));
    }
}
