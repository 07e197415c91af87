use std::path::PathBuf;
use thiserror::Error;

use crate::types::SourceKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{kind} source not found at {}", path.display())]
    SourceMissing { kind: SourceKind, path: PathBuf },

    #[error("Failed to parse {kind} source {}: {message}", path.display())]
    Parse { kind: SourceKind, path: PathBuf, message: String },

    #[error("No documents were extracted from any source; index not built")]
    NoSources,

    #[error("Index rebuild failed: {0}")]
    IndexRebuild(String),

    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
