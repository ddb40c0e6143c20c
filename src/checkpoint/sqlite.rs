//! SQLite checkpoint
//!
//! One row per completed user in `results`, plus run metadata in the
//! `census_info` key/value table. Each batch is a single transaction using
//! `INSERT OR IGNORE`, so a recorded username is never overwritten.

use crate::checkpoint::{Checkpoint, CheckpointRecord, CheckpointStore};
use crate::error::{CheckpointError, CheckpointResult};
use crate::scanner::types::{FileSource, ScanResult, ScanStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

const CREATE_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS results (
    username TEXT PRIMARY KEY,
    file_count INTEGER NOT NULL,
    total_size INTEGER NOT NULL,
    status TEXT NOT NULL,         -- success, empty, error
    source TEXT NOT NULL,         -- both, source_a, source_b, none
    error TEXT,
    completed_at TEXT NOT NULL    -- RFC 3339
)
"#;

const CREATE_CENSUS_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS census_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Durability over speed: every committed batch must survive a crash
const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = FULL;
"#;

/// Metadata keys stored in `census_info`
pub mod keys {
    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Users recorded so far
    pub const COMPLETED: &str = "completed";

    /// Timestamp of the last committed batch (RFC 3339)
    pub const UPDATED_AT: &str = "updated_at";

    /// Tool version that last wrote the store
    pub const CENSUS_VERSION: &str = "census_version";
}

/// Checkpoint kept in a SQLite database
pub struct SqliteStore {
    path: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database and its schema
    pub fn open(path: &Path) -> CheckpointResult<Self> {
        let conn = Connection::open(path)?;
        create_schema(&conn)?;
        set_info(&conn, keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
        debug!(path = %path.display(), "SQLite checkpoint opened");
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    /// Read a metadata value
    pub fn info(&self, key: &str) -> CheckpointResult<Option<String>> {
        get_info(&self.conn, key)
    }

    fn corrupt(&self, reason: String) -> CheckpointError {
        CheckpointError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

fn create_schema(conn: &Connection) -> CheckpointResult<()> {
    conn.execute_batch(PRAGMAS)?;
    conn.execute(CREATE_RESULTS_TABLE, [])?;
    conn.execute(CREATE_CENSUS_INFO_TABLE, [])?;
    Ok(())
}

fn set_info(conn: &Connection, key: &str, value: &str) -> CheckpointResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO census_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

fn get_info(conn: &Connection, key: &str) -> CheckpointResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM census_info WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?)
}

fn parse_status(value: &str) -> Option<ScanStatus> {
    match value {
        "success" => Some(ScanStatus::Success),
        "empty" => Some(ScanStatus::Empty),
        "error" => Some(ScanStatus::Error),
        _ => None,
    }
}

fn parse_source(value: &str) -> Option<FileSource> {
    match value {
        "both" => Some(FileSource::Both),
        "source_a" => Some(FileSource::SourceA),
        "source_b" => Some(FileSource::SourceB),
        "none" => Some(FileSource::None),
        _ => None,
    }
}

/// Raw row before validation
struct ResultRow {
    username: String,
    file_count: i64,
    total_size: i64,
    status: String,
    source: String,
    error: Option<String>,
    completed_at: String,
}

impl CheckpointStore for SqliteStore {
    fn load(&mut self) -> CheckpointResult<Checkpoint> {
        let mut stmt = self.conn.prepare(
            "SELECT username, file_count, total_size, status, source, error, completed_at FROM results",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ResultRow {
                username: row.get(0)?,
                file_count: row.get(1)?,
                total_size: row.get(2)?,
                status: row.get(3)?,
                source: row.get(4)?,
                error: row.get(5)?,
                completed_at: row.get(6)?,
            })
        })?;

        let mut checkpoint = Checkpoint::new();
        for row in rows {
            let row = row?;
            let status = parse_status(&row.status)
                .ok_or_else(|| self.corrupt(format!("unknown status '{}' for {}", row.status, row.username)))?;
            let source = parse_source(&row.source)
                .ok_or_else(|| self.corrupt(format!("unknown source '{}' for {}", row.source, row.username)))?;
            let completed_at = DateTime::parse_from_rfc3339(&row.completed_at)
                .map_err(|e| self.corrupt(format!("bad timestamp for {}: {}", row.username, e)))?
                .with_timezone(&Utc);

            checkpoint.insert(CheckpointRecord {
                result: ScanResult {
                    username: row.username,
                    file_count: row.file_count.max(0) as u64,
                    total_size: row.total_size.max(0) as u64,
                    status,
                    source,
                    error: row.error,
                },
                completed_at,
            });
        }

        Ok(checkpoint)
    }

    fn append_batch(&mut self, records: &[CheckpointRecord]) -> CheckpointResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut added = 0;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO results (username, file_count, total_size, status, source, error, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for record in records {
                let r = &record.result;
                added += stmt.execute(params![
                    r.username,
                    r.file_count as i64,
                    r.total_size as i64,
                    r.status.as_str(),
                    r.source.as_str(),
                    r.error,
                    record.completed_at.to_rfc3339(),
                ])?;
            }
        }

        let completed: i64 = tx.query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        set_info(&tx, keys::COMPLETED, &completed.to_string())?;
        set_info(&tx, keys::UPDATED_AT, &Utc::now().to_rfc3339())?;
        set_info(&tx, keys::CENSUS_VERSION, env!("CARGO_PKG_VERSION"))?;
        tx.commit()?;

        debug!(path = %self.path.display(), added, completed, "Checkpoint batch committed");
        Ok(added)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
