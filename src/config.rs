use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// On-disk configuration, JSON. Every field is optional; omitted fields
/// fall back to the defaults of the public OAS unpaired layout.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Ordered subset of source data columns kept in each child table.
    pub columns: Vec<String>,
    pub database: Utf8PathBuf,
    pub suffix: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("oas-ingest.json"),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(IngestError::MissingConfig(config_path));
            }
            // No explicit config and no default file: pure defaults.
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        let columns = config.columns.unwrap_or_else(default_columns);
        if columns.is_empty() {
            return Err(IngestError::ConfigParse(
                "columns must name at least one source column".to_string(),
            ));
        }
        if columns.iter().any(|column| column == "run_id") {
            return Err(IngestError::ConfigParse(
                "run_id is appended automatically and cannot be a projected column".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            columns,
            database: Utf8PathBuf::from(
                config.database.unwrap_or_else(|| "multi_run_data.db".to_string()),
            ),
            suffix: config.suffix.unwrap_or_else(|| ".csv.gz".to_string()),
        })
    }
}

pub fn default_columns() -> Vec<String> {
    vec![
        "sequence_alignment_aa".to_string(),
        "germline_alignment_aa".to_string(),
        "v_call".to_string(),
        "d_call".to_string(),
        "j_call".to_string(),
        "ANARCI_status".to_string(),
    ]
}
