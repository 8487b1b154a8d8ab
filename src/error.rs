use thiserror::Error;

use crate::parse::PromptError;
use crate::types::SchemaError;

/// Unified error type covering rule validation, prompt tokenizing, and I/O.
///
/// Returned by convenience methods like [`Snapshot::from_sources()`](crate::Snapshot::from_sources)
/// and [`Snapshot::from_dir()`](crate::Snapshot::from_dir).
#[derive(Debug, Error)]
pub enum TagweaveError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
