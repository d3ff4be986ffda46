use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::IngestError;

/// Enumerates candidate source files directly under `root` whose names end
/// with `suffix`. No ordering is part of the contract; entries are sorted
/// by name only so runs are reproducible for humans reading the log.
/// Content validation is the extractor's job.
pub fn scan(root: &Utf8Path, suffix: &str) -> Result<Vec<Utf8PathBuf>, IngestError> {
    let entries = fs::read_dir(root.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("read dir {root}: {err}")))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|path| IngestError::Filesystem(format!("non-UTF-8 path {}", path.display())))?;
        if path.is_file() && path.as_str().ends_with(suffix) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_filters_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("a.csv.gz"), b"x").unwrap();
        fs::write(root.join("b.csv"), b"x").unwrap();
        fs::write(root.join("c.txt"), b"x").unwrap();
        fs::create_dir(root.join("sub.csv.gz")).unwrap();

        let files = scan(&root, ".csv.gz").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].as_str().ends_with("a.csv.gz"));
    }

    #[test]
    fn scan_missing_root_fails() {
        let err = scan(Utf8Path::new("/definitely/not/here"), ".csv.gz").unwrap_err();
        assert!(matches!(err, IngestError::Filesystem(_)));
    }
}
