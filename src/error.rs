//! Error types for bosched.

use std::path::PathBuf;

use thiserror::Error;

use crate::chunk::Policy;
use crate::state::RegionId;
use crate::surrogate::FitFailure;

/// Errors that can occur when starting, stopping, or querying the engine.
///
/// Hook functions called from inside a parallel region never return these;
/// they log and fall back to plain values instead.
#[derive(Debug, Error)]
pub enum BoschedError {
    /// Error extracting configuration from figment.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A state, statistics, mixture, or workload file could not be read or written.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted file exists but does not parse.
    #[error("malformed state file {path}: {source}")]
    MalformedState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A persisted region record parses but violates a state invariant.
    #[error("corrupt record for region {region}: {reason}")]
    CorruptRecord { region: RegionId, reason: String },

    /// Snapshot serialization failed.
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A non-adaptive policy has no entry in the workload-parameter table.
    #[error("no workload entry for region {region} under {policy}")]
    MissingWorkload { region: RegionId, policy: Policy },

    /// Mixture weights, means, and standard deviations are inconsistent.
    #[error("invalid mixture: {0}")]
    InvalidMixture(String),

    /// A persisted surrogate model could not be restored.
    #[error("cannot restore surrogate for region {region}: {source}")]
    Restore {
        region: RegionId,
        #[source]
        source: FitFailure,
    },

    /// Error building the rayon thread team.
    #[error("failed to build rayon thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type alias for bosched operations.
pub type Result<T> = std::result::Result<T, BoschedError>;
