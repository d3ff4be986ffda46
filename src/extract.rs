use std::fs::File;

use camino::Utf8Path;
use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;

use crate::domain::RunMetadata;
use crate::error::IngestError;
use crate::project;

/// One fully consumed source file: the run metadata recovered from the
/// header slot plus the projected data rows, each carrying the run id.
#[derive(Debug)]
pub struct Extraction {
    pub metadata: RunMetadata,
    pub rows: Vec<Vec<String>>,
}

/// Extracts metadata and projected rows from one `.csv.gz` source file.
///
/// The file format stores a JSON metadata object in the physical position a
/// column header would occupy; the real data header is the second record.
/// Both payloads share the same row/column slot, so the file is read in two
/// passes: one that decodes only the header slot as JSON, and one that skips
/// it and reads the data body. Single-pass decoding cannot tell the two
/// payloads apart.
pub fn extract(path: &Utf8Path, columns: &[String]) -> Result<Extraction, IngestError> {
    let metadata = read_metadata(path)?;
    let (header, records) = read_body(path)?;
    let rows = project::project(path.as_str(), &header, &records, columns, &metadata.run_id)?;
    Ok(Extraction { metadata, rows })
}

/// Pass one: decode the header-slot JSON into a metadata record.
fn read_metadata(path: &Utf8Path) -> Result<RunMetadata, IngestError> {
    let mut reader = open_csv(path)?;
    let mut record = StringRecord::new();
    let got = reader
        .read_record(&mut record)
        .map_err(|err| classify(path, &err))?;
    if !got {
        return Err(IngestError::TransferIncomplete {
            path: path.to_string(),
            reason: "file contains no header record".to_string(),
        });
    }

    let blob = record.get(0).unwrap_or("");
    serde_json::from_str(blob).map_err(|err| IngestError::SchemaViolation {
        path: path.to_string(),
        reason: format!("header slot is not a valid metadata object: {err}"),
    })
}

/// Pass two: skip the metadata slot, take the next record as the data
/// header and collect the remaining records as data rows.
fn read_body(path: &Utf8Path) -> Result<(StringRecord, Vec<StringRecord>), IngestError> {
    let mut reader = open_csv(path)?;
    let mut records = reader.records();

    // Discard the metadata slot; pass one already decoded it.
    match records.next() {
        Some(Ok(_)) => {}
        Some(Err(err)) => return Err(classify(path, &err)),
        None => {
            return Err(IngestError::TransferIncomplete {
                path: path.to_string(),
                reason: "file contains no header record".to_string(),
            });
        }
    }

    let header = match records.next() {
        Some(Ok(record)) => record,
        Some(Err(err)) => return Err(classify(path, &err)),
        None => {
            return Err(IngestError::SchemaViolation {
                path: path.to_string(),
                reason: "no data header row after the metadata slot".to_string(),
            });
        }
    };

    let mut rows = Vec::new();
    for record in records {
        rows.push(record.map_err(|err| classify(path, &err))?);
    }
    Ok((header, rows))
}

fn open_csv(path: &Utf8Path) -> Result<csv::Reader<GzDecoder<File>>, IngestError> {
    let file = File::open(path).map_err(|err| IngestError::TransferIncomplete {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    Ok(ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(GzDecoder::new(file)))
}

/// I/O failures mid-read mean a truncated or corrupt download; anything
/// else (bad UTF-8, malformed quoting) is a schema problem with the file.
fn classify(path: &Utf8Path, err: &csv::Error) -> IngestError {
    if let csv::ErrorKind::Io(io_err) = err.kind() {
        IngestError::TransferIncomplete {
            path: path.to_string(),
            reason: io_err.to_string(),
        }
    } else {
        IngestError::SchemaViolation {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }
}
