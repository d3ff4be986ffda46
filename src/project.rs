use csv::StringRecord;

use crate::domain::RunId;
use crate::error::IngestError;

/// Projects raw data rows down to the configured column subset, in the
/// configured order, with the run id appended as the trailing field.
///
/// A configured column absent from the header is a per-file failure
/// (`MissingColumn`), surfaced before any row is produced so a file never
/// yields a partial row set.
pub fn project(
    path: &str,
    header: &StringRecord,
    records: &[StringRecord],
    columns: &[String],
    run_id: &RunId,
) -> Result<Vec<Vec<String>>, IngestError> {
    let mut indices = Vec::with_capacity(columns.len());
    for column in columns {
        let index = header
            .iter()
            .position(|field| field == column)
            .ok_or_else(|| IngestError::MissingColumn {
                path: path.to_string(),
                column: column.clone(),
            })?;
        indices.push(index);
    }

    let rows = records
        .iter()
        .map(|record| {
            let mut row = Vec::with_capacity(indices.len() + 1);
            for &index in &indices {
                // Short rows are tolerated; missing trailing cells read as empty.
                row.push(record.get(index).unwrap_or("").to_string());
            }
            row.push(run_id.as_str().to_string());
            row
        })
        .collect();

    Ok(rows)
}
