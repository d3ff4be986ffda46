use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Identifier of one sequencing run. Unique across the store; primary key
/// of the parent table and foreign key of every child table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct RunId(String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic, injective mapping from a run id to a safe SQL table
    /// identifier. ASCII alphanumerics pass through unchanged; every other
    /// byte (underscore included, to keep the mapping injective) is encoded
    /// as `_xx` lowercase hex. Plain alphanumeric ids map to `DataTable_<id>`.
    pub fn table_name(&self) -> String {
        let mut name = String::with_capacity(self.0.len() + 10);
        name.push_str("DataTable_");
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() {
                name.push(byte as char);
            } else {
                name.push_str(&format!("_{byte:02x}"));
            }
        }
        name
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        if normalized.is_empty() {
            return Err(IngestError::InvalidRunId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for RunId {
    type Error = IngestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Run-level metadata embedded in each source file's header slot as a JSON
/// object. Field names follow the source payload; `Run` is the only required
/// key — its absence is a schema violation, never defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(rename = "Run")]
    pub run_id: RunId,
    #[serde(rename = "Species", default)]
    pub species: Option<String>,
    #[serde(rename = "BSource", default)]
    pub b_source: Option<String>,
    #[serde(rename = "BType", default)]
    pub b_type: Option<String>,
    #[serde(rename = "Chain", default)]
    pub chain: Option<String>,
    #[serde(rename = "Isotype", default)]
    pub isotype: Option<String>,
    #[serde(rename = "Age", default)]
    pub age: Option<String>,
    #[serde(rename = "Longitudinal", default)]
    pub longitudinal: Option<String>,
    #[serde(rename = "Subject", default)]
    pub subject: Option<String>,
    #[serde(rename = "Disease", default)]
    pub disease: Option<String>,
    #[serde(rename = "Vaccine", default)]
    pub vaccine: Option<String>,
    #[serde(rename = "Author", default)]
    pub author: Option<String>,
    #[serde(rename = "Link", default)]
    pub link: Option<String>,
    #[serde(rename = "Total sequences", default)]
    pub total_sequences: Option<i64>,
    #[serde(rename = "Unique sequences", default)]
    pub unique_sequences: Option<i64>,
}
