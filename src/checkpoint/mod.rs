//! Checkpoint store - durable record of completed users
//!
//! The checkpoint maps each finished username to its [`ScanResult`] plus a
//! completion timestamp. It is append-only: a username that is already
//! recorded is never removed or overwritten, within a run or across resumed
//! runs.
//!
//! Two backends implement [`CheckpointStore`]:
//! - [`JsonStore`]: one JSON document, rewritten through a temp file and an
//!   atomic rename, so readers see either the old or the new file
//! - [`SqliteStore`]: one row per user, one transaction per batch
//!
//! [`open_store`] picks the backend from the file extension.

pub mod json;
pub mod sqlite;

pub use json::JsonStore;
pub use sqlite::SqliteStore;

use crate::error::CheckpointResult;
use crate::scanner::types::ScanResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default checkpoint file name
pub const DEFAULT_CHECKPOINT_PATH: &str = "census.checkpoint.json";

/// One completed user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    #[serde(flatten)]
    pub result: ScanResult,

    /// When the scan finished
    pub completed_at: DateTime<Utc>,
}

impl CheckpointRecord {
    /// Stamp a result with the current time
    pub fn now(result: ScanResult) -> Self {
        Self {
            result,
            completed_at: Utc::now(),
        }
    }

    /// Username this record belongs to
    pub fn username(&self) -> &str {
        &self.result.username
    }
}

/// In-memory view of everything recorded so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    records: HashMap<String, CheckpointRecord>,
    completed: u64,
}

impl Checkpoint {
    /// Create an empty checkpoint
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record unless its username is already present
    ///
    /// Returns whether the record was added.
    pub fn insert(&mut self, record: CheckpointRecord) -> bool {
        if self.records.contains_key(record.username()) {
            return false;
        }
        self.records.insert(record.username().to_string(), record);
        self.completed += 1;
        true
    }

    /// Check if a username is recorded
    pub fn contains(&self, username: &str) -> bool {
        self.records.contains_key(username)
    }

    /// Recorded result for a username
    pub fn get(&self, username: &str) -> Option<&ScanResult> {
        self.records.get(username).map(|r| &r.result)
    }

    /// Number of recorded users; never decreases
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Number of recorded users
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by completion time, then username
    pub fn ordered_records(&self) -> Vec<&CheckpointRecord> {
        let mut records: Vec<&CheckpointRecord> = self.records.values().collect();
        records.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.username().cmp(b.username()))
        });
        records
    }
}

/// Backing store for the checkpoint
///
/// Writes must be atomic: after a crash the store holds either the state
/// before a batch or the state after it, never part of a record.
pub trait CheckpointStore: Send {
    /// Read everything recorded so far
    fn load(&mut self) -> CheckpointResult<Checkpoint>;

    /// Durably record a batch, skipping usernames already present
    ///
    /// Returns how many records were newly added.
    fn append_batch(&mut self, records: &[CheckpointRecord]) -> CheckpointResult<usize>;

    /// Human-readable location of the store
    fn describe(&self) -> String;
}

/// Checkpoint file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// Single JSON document
    Json,
    /// SQLite database
    Sqlite,
}

impl CheckpointFormat {
    /// Pick the format from the file extension; `.db`, `.sqlite` and
    /// `.sqlite3` select SQLite, anything else JSON
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("db" | "sqlite" | "sqlite3") => CheckpointFormat::Sqlite,
            _ => CheckpointFormat::Json,
        }
    }
}

/// Open (or create) the checkpoint store at `path`
pub fn open_store(path: &Path) -> CheckpointResult<Box<dyn CheckpointStore>> {
    Ok(match CheckpointFormat::from_path(path) {
        CheckpointFormat::Json => Box::new(JsonStore::open(path)?),
        CheckpointFormat::Sqlite => Box::new(SqliteStore::open(path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::types::FileSource;
    use std::path::PathBuf;

    #[test]
    fn test_insert_is_append_only() {
        let mut checkpoint = Checkpoint::new();
        assert!(checkpoint.insert(CheckpointRecord::now(ScanResult::success("u1", 1, 10, FileSource::SourceA))));
        assert!(!checkpoint.insert(CheckpointRecord::now(ScanResult::empty("u1"))));

        assert_eq!(checkpoint.completed(), 1);
        assert_eq!(checkpoint.get("u1").map(|r| r.file_count), Some(1));
        assert!(!checkpoint.contains("u2"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CheckpointFormat::from_path(&PathBuf::from("c.json")), CheckpointFormat::Json);
        assert_eq!(CheckpointFormat::from_path(&PathBuf::from("c.DB")), CheckpointFormat::Sqlite);
        assert_eq!(CheckpointFormat::from_path(&PathBuf::from("c.sqlite")), CheckpointFormat::Sqlite);
        assert_eq!(CheckpointFormat::from_path(&PathBuf::from("checkpoint")), CheckpointFormat::Json);
    }

    #[test]
    fn test_record_json_shape() {
        let record = CheckpointRecord::now(ScanResult::error("u9", "boom"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["username"], "u9");
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "boom");
        assert!(value["completed_at"].is_string());
    }
}
