use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use oas_ingest::config::default_columns;
use oas_ingest::error::IngestError;
use oas_ingest::extract::extract;

const DATA_HEADER: &str =
    "sequence_alignment_aa,germline_alignment_aa,v_call,d_call,j_call,ANARCI_status";

fn write_run_file(dir: &Path, name: &str, metadata: &str, body: &[&str]) -> Utf8PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap();
    let mut gz = GzEncoder::new(file, Compression::default());
    // The metadata JSON sits in the header slot as one quoted CSV field.
    writeln!(gz, "\"{}\"", metadata.replace('"', "\"\"")).unwrap();
    for line in body {
        writeln!(gz, "{line}").unwrap();
    }
    gz.finish().unwrap();
    Utf8PathBuf::from_path_buf(path).unwrap()
}

#[test]
fn extracts_metadata_and_projected_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(
        dir.path(),
        "run1.csv.gz",
        r#"{"Run": "R1", "Species": "human", "Total sequences": 100}"#,
        &[
            DATA_HEADER,
            "EVQ,EVQ,IGHV1-2,IGHD3,IGHJ4,good",
            "QVQ,QVQ,IGHV3-23,IGHD2,IGHJ6,good",
            "DVQ,DVQ,IGHV4-34,IGHD1,IGHJ3,good",
        ],
    );

    let extraction = extract(&path, &default_columns()).unwrap();
    assert_eq!(extraction.metadata.run_id.as_str(), "R1");
    assert_eq!(extraction.metadata.species.as_deref(), Some("human"));
    assert_eq!(extraction.metadata.total_sequences, Some(100));
    assert_eq!(extraction.rows.len(), 3);
    for row in &extraction.rows {
        assert_eq!(row.len(), 7);
        assert_eq!(row.last().map(String::as_str), Some("R1"));
    }
    assert_eq!(extraction.rows[0][0], "EVQ");
    assert_eq!(extraction.rows[1][2], "IGHV3-23");
}

#[test]
fn truncated_file_is_transfer_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(
        dir.path(),
        "run1.csv.gz",
        r#"{"Run": "R1"}"#,
        &[DATA_HEADER, "EVQ,EVQ,IGHV1-2,IGHD3,IGHJ4,good"],
    );
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let err = extract(&path, &default_columns()).unwrap_err();
    assert_matches!(err, IngestError::TransferIncomplete { .. });
}

#[test]
fn empty_file_is_transfer_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv.gz");
    fs::write(&path, b"").unwrap();
    let path = Utf8PathBuf::from_path_buf(path).unwrap();

    let err = extract(&path, &default_columns()).unwrap_err();
    assert_matches!(err, IngestError::TransferIncomplete { .. });
}

#[test]
fn malformed_header_json_is_schema_violation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(
        dir.path(),
        "run1.csv.gz",
        "not json at all",
        &[DATA_HEADER, "EVQ,EVQ,IGHV1-2,IGHD3,IGHJ4,good"],
    );

    let err = extract(&path, &default_columns()).unwrap_err();
    assert_matches!(err, IngestError::SchemaViolation { .. });
}

#[test]
fn missing_run_field_is_schema_violation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(
        dir.path(),
        "run1.csv.gz",
        r#"{"Species": "human"}"#,
        &[DATA_HEADER, "EVQ,EVQ,IGHV1-2,IGHD3,IGHJ4,good"],
    );

    let err = extract(&path, &default_columns()).unwrap_err();
    assert_matches!(err, IngestError::SchemaViolation { .. });
}

#[test]
fn missing_data_header_is_schema_violation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(dir.path(), "run1.csv.gz", r#"{"Run": "R1"}"#, &[]);

    let err = extract(&path, &default_columns()).unwrap_err();
    assert_matches!(err, IngestError::SchemaViolation { .. });
}

#[test]
fn missing_configured_column_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(
        dir.path(),
        "run1.csv.gz",
        r#"{"Run": "R1"}"#,
        &["v_call,j_call", "IGHV1-2,IGHJ4"],
    );

    let err = extract(&path, &default_columns()).unwrap_err();
    assert_matches!(
        err,
        IngestError::MissingColumn { ref column, .. } if column == "sequence_alignment_aa"
    );
}

#[test]
fn run_with_no_data_rows_extracts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(dir.path(), "run1.csv.gz", r#"{"Run": "R1"}"#, &[DATA_HEADER]);

    let extraction = extract(&path, &default_columns()).unwrap();
    assert_eq!(extraction.metadata.run_id.as_str(), "R1");
    assert!(extraction.rows.is_empty());
}
