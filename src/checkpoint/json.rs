//! JSON file checkpoint
//!
//! The whole checkpoint is one document. Each batch rewrites it into a
//! temporary file in the same directory, fsyncs it and renames it over the
//! previous file.

use crate::checkpoint::{Checkpoint, CheckpointRecord, CheckpointStore};
use crate::error::{CheckpointError, CheckpointResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Document format version
pub const JSON_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    completed: u64,
    updated_at: DateTime<Utc>,
    records: Vec<CheckpointRecord>,
}

/// Checkpoint kept in a single JSON file
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    state: Checkpoint,
}

impl JsonStore {
    /// Open the store, reading the file if it exists
    pub fn open(path: &Path) -> CheckpointResult<Self> {
        let state = read_document(path)?;
        debug!(path = %path.display(), records = state.len(), "JSON checkpoint opened");
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    /// Path of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, state: &Checkpoint) -> CheckpointResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };

        let document = Document {
            version: JSON_FORMAT_VERSION,
            completed: state.completed(),
            updated_at: Utc::now(),
            records: state.ordered_records().into_iter().cloned().collect(),
        };

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writer.write_all(b"\n").map_err(io_err)?;
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;

        tmp.persist(&self.path).map_err(|e| CheckpointError::Persist {
            path: self.path.clone(),
            reason: e.error.to_string(),
        })?;
        Ok(())
    }
}

fn read_document(path: &Path) -> CheckpointResult<Checkpoint> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Checkpoint::new()),
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let document: Document =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if document.version > JSON_FORMAT_VERSION {
        return Err(CheckpointError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("unsupported format version {}", document.version),
        });
    }

    let mut checkpoint = Checkpoint::new();
    for record in document.records {
        checkpoint.insert(record);
    }
    Ok(checkpoint)
}

impl CheckpointStore for JsonStore {
    fn load(&mut self) -> CheckpointResult<Checkpoint> {
        Ok(self.state.clone())
    }

    fn append_batch(&mut self, records: &[CheckpointRecord]) -> CheckpointResult<usize> {
        // The cached state only advances once the file is on disk
        let mut next = self.state.clone();
        let mut added = 0;
        for record in records {
            if next.insert(record.clone()) {
                added += 1;
            }
        }

        if added > 0 {
            self.write(&next)?;
            self.state = next;
            debug!(path = %self.path.display(), added, total = self.state.completed(), "Checkpoint written");
        }
        Ok(added)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::types::{FileSource, ScanResult};
    use tempfile::tempdir;

    #[test]
    fn test_append_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("census.json");

        let mut store = JsonStore::open(&path).unwrap();
        assert!(store.load().unwrap().is_empty());

        let added = store
            .append_batch(&[
                CheckpointRecord::now(ScanResult::success("u1", 5, 500, FileSource::SourceA)),
                CheckpointRecord::now(ScanResult::empty("u2")),
            ])
            .unwrap();
        assert_eq!(added, 2);

        let mut reopened = JsonStore::open(&path).unwrap();
        let checkpoint = reopened.load().unwrap();
        assert_eq!(checkpoint.completed(), 2);
        assert_eq!(checkpoint.get("u1").unwrap().total_size, 500);
    }

    #[test]
    fn test_existing_records_are_not_overwritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("census.json");

        let mut store = JsonStore::open(&path).unwrap();
        store
            .append_batch(&[CheckpointRecord::now(ScanResult::success("u1", 5, 500, FileSource::SourceA))])
            .unwrap();

        let added = store
            .append_batch(&[CheckpointRecord::now(ScanResult::error("u1", "late duplicate"))])
            .unwrap();
        assert_eq!(added, 0);

        let checkpoint = JsonStore::open(&path).unwrap().load().unwrap();
        assert_eq!(checkpoint.get("u1").unwrap().file_count, 5);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("census.json");

        let mut store = JsonStore::open(&path).unwrap();
        for i in 0..5 {
            store
                .append_batch(&[CheckpointRecord::now(ScanResult::empty(&format!("u{i}")))])
                .unwrap();
        }

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_failed_write_leaves_state_unchanged() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("state");
        std::fs::create_dir(&sub).unwrap();
        let path = sub.join("census.json");

        let mut store = JsonStore::open(&path).unwrap();
        store
            .append_batch(&[CheckpointRecord::now(ScanResult::empty("u1"))])
            .unwrap();

        std::fs::remove_dir_all(&sub).unwrap();
        let result = store.append_batch(&[CheckpointRecord::now(ScanResult::empty("u2"))]);
        assert!(result.is_err());

        let state = store.load().unwrap();
        assert_eq!(state.completed(), 1);
        assert!(!state.contains("u2"));

        // The same record is accepted once the directory is back
        std::fs::create_dir(&sub).unwrap();
        let added = store
            .append_batch(&[CheckpointRecord::now(ScanResult::empty("u2"))])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(JsonStore::open(&path).unwrap().load().unwrap().completed(), 2);
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("census.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(JsonStore::open(&path), Err(CheckpointError::Corrupt { .. })));
    }
}
