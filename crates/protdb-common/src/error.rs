//! Error types for protdb

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protdb operations
pub type Result<T> = std::result::Result<T, ProtdbError>;

/// Errors raised while building or preparing a run.
///
/// Failures of individual jobs are not errors at this level; they are recorded
/// on the job's result and propagate to its dependents as skips.
#[derive(Error, Debug)]
pub enum ProtdbError {
    #[error("Invalid species: '{0}' (expected one of: human, mouse, rat, pig, rabbit, zebrafish, ecoli)")]
    InvalidSpecies(String),

    #[error("Invalid variant: '{0}' (expected one of: pro-sw, pro-sw-tr, uni-sw, uni-sw-tr)")]
    InvalidVariant(String),

    #[error("Invalid stage: '{0}'")]
    InvalidStage(String),

    #[error("Invalid date tag: '{0}' (expected YYYYMM or YYYYMM.suffix)")]
    InvalidDateTag(String),

    #[error("Cyclic dependency between jobs: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Duplicate job: {first} and {second} both resolve to {}", path.display())]
    DuplicateJob {
        first: String,
        second: String,
        path: PathBuf,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
