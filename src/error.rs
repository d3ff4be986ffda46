use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("invalid run id: {0}")]
    InvalidRunId(String),

    #[error("incomplete source file {path}: {reason}")]
    TransferIncomplete { path: String, reason: String },

    #[error("schema violation in {path}: {reason}")]
    SchemaViolation { path: String, reason: String },

    #[error("column {column} not found in {path}")]
    MissingColumn { path: String, column: String },

    #[error("referential integrity broken: {0}")]
    ReferentialIntegrity(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("missing config file at {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl IngestError {
    /// Failures scoped to a single source file. The batch logs them,
    /// skips the file and continues; everything else aborts the batch.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            IngestError::TransferIncomplete { .. }
                | IngestError::SchemaViolation { .. }
                | IngestError::MissingColumn { .. }
        )
    }
}
