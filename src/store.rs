use camino::Utf8Path;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::domain::{RunId, RunMetadata};
use crate::error::IngestError;

pub const PARENT_TABLE: &str = "Main_Run_Table";

/// Two-tier relational store: one deduplicated parent table of run
/// metadata, one child table per run holding its projected sequence rows.
/// A single process owns the store for the duration of a batch.
pub struct RunStore {
    conn: Connection,
    columns: Vec<String>,
}

/// Outcome of ingesting one file's worth of data, committed atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIngest {
    pub new_run: bool,
    pub rows: usize,
}

/// Read-only query result exposed to the query surface.
#[derive(Debug, serde::Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RunStore {
    pub fn open(path: &Utf8Path, columns: &[String]) -> Result<Self, IngestError> {
        let conn = Connection::open(path)?;
        Self::init(conn, columns)
    }

    pub fn open_in_memory(columns: &[String]) -> Result<Self, IngestError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, columns)
    }

    fn init(conn: Connection, columns: &[String]) -> Result<Self, IngestError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {PARENT_TABLE} (
                    run_id TEXT PRIMARY KEY,
                    species TEXT,
                    b_source TEXT,
                    b_type TEXT,
                    chain TEXT,
                    isotype TEXT,
                    age TEXT,
                    longitudinal TEXT,
                    subject TEXT,
                    disease TEXT,
                    vaccine TEXT,
                    author TEXT,
                    link TEXT,
                    total_sequences INTEGER,
                    unique_sequences INTEGER
                )"
            ),
            [],
        )?;
        Ok(Self {
            conn,
            columns: columns.to_vec(),
        })
    }

    /// Consults the parent table directly, so deduplication also holds
    /// against runs written by earlier batches into the same store.
    pub fn is_known(&self, run_id: &RunId) -> Result<bool, IngestError> {
        let exists = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {PARENT_TABLE} WHERE run_id = ?1"),
                params![run_id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Writes a run's metadata to the parent table unless the run is already
    /// known. First write wins: returns false and leaves the existing row
    /// untouched when the run id is present.
    pub fn record(&self, metadata: &RunMetadata) -> Result<bool, IngestError> {
        if self.is_known(&metadata.run_id)? {
            return Ok(false);
        }
        insert_metadata(&self.conn, metadata)?;
        Ok(true)
    }

    /// Commits one file as a single unit of work: the parent row (unless the
    /// run is already known, first write wins), the child table, and all
    /// projected rows. All rows or none; the parent write always lands in
    /// the same transaction as, and before, the first child write.
    pub fn ingest_file(
        &mut self,
        metadata: &RunMetadata,
        rows: &[Vec<String>],
    ) -> Result<FileIngest, IngestError> {
        let table = metadata.run_id.table_name();
        let tx = self.conn.transaction()?;

        let known = tx
            .query_row(
                &format!("SELECT 1 FROM {PARENT_TABLE} WHERE run_id = ?1"),
                params![metadata.run_id.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !known {
            insert_metadata(&tx, metadata)?;
        }

        let mut column_defs = self
            .columns
            .iter()
            .map(|column| format!("{} TEXT", quote_ident(column)))
            .collect::<Vec<_>>();
        column_defs.push("run_id TEXT NOT NULL".to_string());
        column_defs.push(format!(
            "FOREIGN KEY(run_id) REFERENCES {PARENT_TABLE}(run_id) ON DELETE CASCADE"
        ));
        tx.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote_ident(&table),
                column_defs.join(", ")
            ),
            [],
        )?;

        let mut insert_columns = self
            .columns
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>();
        insert_columns.push("run_id".to_string());
        let placeholders = (1..=insert_columns.len())
            .map(|n| format!("?{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table),
            insert_columns.join(", "),
            placeholders
        ))?;
        for row in rows {
            insert
                .execute(params_from_iter(row.iter()))
                .map_err(|err| map_write_error(&metadata.run_id, err))?;
        }
        drop(insert);

        tx.commit()?;
        debug!(run_id = %metadata.run_id, table = %table, rows = rows.len(), "file committed");
        Ok(FileIngest {
            new_run: !known,
            rows: rows.len(),
        })
    }

    pub fn list_runs(&self) -> Result<Vec<RunMetadata>, IngestError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT run_id, species, b_source, b_type, chain, isotype, age,
                    longitudinal, subject, disease, vaccine, author, link,
                    total_sequences, unique_sequences
             FROM {PARENT_TABLE} ORDER BY run_id"
        ))?;
        let runs = stmt
            .query_map([], |row| {
                let run_id: String = row.get(0)?;
                Ok((
                    run_id,
                    RowMeta {
                        species: row.get(1)?,
                        b_source: row.get(2)?,
                        b_type: row.get(3)?,
                        chain: row.get(4)?,
                        isotype: row.get(5)?,
                        age: row.get(6)?,
                        longitudinal: row.get(7)?,
                        subject: row.get(8)?,
                        disease: row.get(9)?,
                        vaccine: row.get(10)?,
                        author: row.get(11)?,
                        link: row.get(12)?,
                        total_sequences: row.get(13)?,
                        unique_sequences: row.get(14)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        runs.into_iter()
            .map(|(run_id, meta)| {
                Ok(RunMetadata {
                    run_id: run_id
                        .parse()
                        .map_err(|_| IngestError::ReferentialIntegrity(
                            "parent table holds an empty run_id".to_string(),
                        ))?,
                    species: meta.species,
                    b_source: meta.b_source,
                    b_type: meta.b_type,
                    chain: meta.chain,
                    isotype: meta.isotype,
                    age: meta.age,
                    longitudinal: meta.longitudinal,
                    subject: meta.subject,
                    disease: meta.disease,
                    vaccine: meta.vaccine,
                    author: meta.author,
                    link: meta.link,
                    total_sequences: meta.total_sequences,
                    unique_sequences: meta.unique_sequences,
                })
            })
            .collect()
    }

    /// Read-only filtered query over the parent table or any child table.
    /// Identifiers are validated against the live schema before they are
    /// spliced; values are always bound as parameters.
    pub fn query(
        &self,
        table: &str,
        filters: &[(String, String)],
        select: Option<&[String]>,
        limit: Option<u32>,
    ) -> Result<QueryResult, IngestError> {
        if !self.table_exists(table)? {
            return Err(IngestError::UnknownTable(table.to_string()));
        }
        let table_columns = self.table_columns(table)?;
        let check = |column: &str| -> Result<(), IngestError> {
            if table_columns.iter().any(|known| known == column) {
                Ok(())
            } else {
                Err(IngestError::UnknownColumn(column.to_string()))
            }
        };

        let selected: Vec<String> = match select {
            Some(columns) if !columns.is_empty() => {
                for column in columns {
                    check(column)?;
                }
                columns.to_vec()
            }
            _ => table_columns.clone(),
        };

        let mut sql = format!(
            "SELECT {} FROM {}",
            selected
                .iter()
                .map(|column| quote_ident(column))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(table)
        );
        let mut values = Vec::new();
        if !filters.is_empty() {
            let mut clauses = Vec::new();
            for (column, value) in filters {
                check(column)?;
                clauses.push(format!("{} = ?{}", quote_ident(column), clauses.len() + 1));
                values.push(value.clone());
            }
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let width = selected.len();
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let mut out = Vec::with_capacity(width);
                for index in 0..width {
                    out.push(json_value(row.get::<_, Value>(index)?));
                }
                Ok(out)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryResult {
            columns: selected,
            rows,
        })
    }

    /// Number of rows currently stored in a run's child table.
    pub fn run_row_count(&self, run_id: &RunId) -> Result<usize, IngestError> {
        let table = run_id.table_name();
        if !self.table_exists(&table)? {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Removes a run: the parent row goes first and the foreign key cascade
    /// clears the child rows; the emptied child table is then dropped.
    /// Child rows are never deleted independently of their parent.
    pub fn delete_run(&mut self, run_id: &RunId) -> Result<bool, IngestError> {
        let table = run_id.table_name();
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {PARENT_TABLE} WHERE run_id = ?1"),
            params![run_id.as_str()],
        )?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table)), [])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, IngestError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>, IngestError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}

struct RowMeta {
    species: Option<String>,
    b_source: Option<String>,
    b_type: Option<String>,
    chain: Option<String>,
    isotype: Option<String>,
    age: Option<String>,
    longitudinal: Option<String>,
    subject: Option<String>,
    disease: Option<String>,
    vaccine: Option<String>,
    author: Option<String>,
    link: Option<String>,
    total_sequences: Option<i64>,
    unique_sequences: Option<i64>,
}

fn insert_metadata(conn: &Connection, metadata: &RunMetadata) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {PARENT_TABLE} (
                run_id, species, b_source, b_type, chain, isotype, age,
                longitudinal, subject, disease, vaccine, author, link,
                total_sequences, unique_sequences
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            metadata.run_id.as_str(),
            metadata.species,
            metadata.b_source,
            metadata.b_type,
            metadata.chain,
            metadata.isotype,
            metadata.age,
            metadata.longitudinal,
            metadata.subject,
            metadata.disease,
            metadata.vaccine,
            metadata.author,
            metadata.link,
            metadata.total_sequences,
            metadata.unique_sequences,
        ],
    )?;
    Ok(())
}

/// Double-quote an SQL identifier, doubling embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A foreign key failure here means the write-ordering invariant was broken
/// upstream; it is a logic error, never a recoverable per-file condition.
fn map_write_error(run_id: &RunId, err: rusqlite::Error) -> IngestError {
    if let rusqlite::Error::SqliteFailure(code, ref message) = err
        && code.code == rusqlite::ErrorCode::ConstraintViolation
        && message
            .as_deref()
            .is_some_and(|text| text.contains("FOREIGN KEY"))
    {
        return IngestError::ReferentialIntegrity(format!(
            "child rows for run {run_id} have no parent row"
        ));
    }
    IngestError::Store(err)
}

fn json_value(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(n) => serde_json::Value::from(n),
        Value::Real(n) => serde_json::Value::from(n),
        Value::Text(s) => serde_json::Value::from(s),
        Value::Blob(bytes) => serde_json::Value::from(format!("<{} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
