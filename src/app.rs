use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::domain::RunMetadata;
use crate::error::IngestError;
use crate::extract;
use crate::intake;
use crate::store::{QueryResult, RunStore};

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub files: Vec<FileOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Ingested {
        run_id: String,
        rows: usize,
        /// False when the run was already known and its metadata was
        /// discarded (first write wins); the rows are appended regardless.
        new_run: bool,
    },
    Skipped {
        reason: String,
    },
}

impl BatchResult {
    pub fn ingested(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.status, FileStatus::Ingested { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.files.len() - self.ingested()
    }
}

pub struct App {
    store: RunStore,
}

impl App {
    pub fn new(store: RunStore) -> Self {
        Self { store }
    }

    /// Ingests every matching file under `root`, one file per transaction.
    /// Recoverable per-file failures are logged and recorded as skips; any
    /// other error aborts the batch. Files already committed stay committed.
    pub fn ingest_batch(
        &mut self,
        root: &Utf8Path,
        config: &ResolvedConfig,
    ) -> Result<BatchResult, IngestError> {
        let paths = intake::scan(root, &config.suffix)?;
        info!(root = %root, files = paths.len(), "starting batch");

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let status = match self.ingest_file(&path, config) {
                Ok(status) => status,
                Err(err) if err.is_file_scoped() => {
                    warn!(path = %path, error = %err, "skipping file");
                    FileStatus::Skipped {
                        reason: err.to_string(),
                    }
                }
                Err(err) => return Err(err),
            };
            files.push(FileOutcome {
                path: path.to_string(),
                status,
            });
        }

        let result = BatchResult { files };
        info!(
            ingested = result.ingested(),
            skipped = result.skipped(),
            "batch finished"
        );
        Ok(result)
    }

    fn ingest_file(
        &mut self,
        path: &Utf8Path,
        config: &ResolvedConfig,
    ) -> Result<FileStatus, IngestError> {
        let extraction = extract::extract(path, &config.columns)?;
        let ingest = self.store.ingest_file(&extraction.metadata, &extraction.rows)?;
        if ingest.new_run {
            info!(
                run_id = %extraction.metadata.run_id,
                rows = ingest.rows,
                "ingested new run"
            );
        } else {
            info!(
                run_id = %extraction.metadata.run_id,
                rows = ingest.rows,
                "run already known, metadata discarded, rows appended"
            );
        }
        Ok(FileStatus::Ingested {
            run_id: extraction.metadata.run_id.to_string(),
            rows: ingest.rows,
            new_run: ingest.new_run,
        })
    }

    pub fn list_runs(&self) -> Result<Vec<RunMetadata>, IngestError> {
        self.store.list_runs()
    }

    pub fn query(
        &self,
        table: &str,
        filters: &[(String, String)],
        select: Option<&[String]>,
        limit: Option<u32>,
    ) -> Result<QueryResult, IngestError> {
        self.store.query(table, filters, select, limit)
    }
}
