//! Error types for the protdb CLI
//!
//! Every error is user-facing; messages say what to check next.

use protdb_common::ProtdbError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Species, variant or date tag outside the supported sets
    #[error("{0}. Run 'protdb species' to list supported species and variants.")]
    InvalidSelection(ProtdbError),

    /// Flags that parse but make no sense together
    #[error("Invalid arguments: {0}")]
    InvalidArgument(String),

    /// protdb.yml could not be read or parsed
    #[error("{0}. Check protdb.yml or the file passed with --config.")]
    ToolConfig(ProtdbError),

    /// The job graph failed validation
    #[error("Invalid job graph: {0}")]
    Graph(ProtdbError),

    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<ProtdbError> for CliError {
    fn from(err: ProtdbError) -> Self {
        match err {
            ProtdbError::InvalidSpecies(_)
            | ProtdbError::InvalidVariant(_)
            | ProtdbError::InvalidStage(_)
            | ProtdbError::InvalidDateTag(_) => Self::InvalidSelection(err),
            ProtdbError::Config(_) => Self::ToolConfig(err),
            ProtdbError::CyclicDependency(_) | ProtdbError::DuplicateJob { .. } => Self::Graph(err),
            ProtdbError::Io(e) => Self::Io(e),
            ProtdbError::Serialization(e) => Self::Json(e),
        }
    }
}
