//! home-census - Per-user file inventory across DBFS and the Workspace
//!
//! Counts files and bytes under every listed user's home directory in two
//! independent namespaces, for thousands of users, while the listing APIs
//! rate-limit us. Completed users are checkpointed as they finish, so an
//! interrupted census resumes without scanning anyone twice.
//!
//! # Features
//!
//! - **Parallel Scanning**: Work units of usernames are spread over a pool of
//!   worker threads, each with its own HTTP client and retry state.
//!
//! - **Rate-Limit Aware**: Capped exponential backoff per failure class, plus
//!   a per-worker AIMD pacing delay that backs off on 429s.
//!
//! - **Resumable**: Append-only checkpoint in JSON or SQLite, written
//!   atomically after every batch of completed users.
//!
//! - **Strategy Fallback**: DBFS is read through the local `/dbfs` mount when
//!   it exists, otherwise through the REST API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │  DBFS  /Users/<name>         │   │  Workspace  /Users/<name>    │
//! │  exact sizes                 │   │  10 KiB per item (estimate)  │
//! └──────────────┬───────────────┘   └───────────────┬──────────────┘
//!                │ list (RetryPolicy)                │
//!                ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                              │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐        ┌──────────┐   │
//! │  │ Worker 1 │  │ Worker 2 │  │ Worker 3 │  ...   │ Worker N │   │
//! │  │UserScanner│ │UserScanner│ │UserScanner│       │UserScanner│  │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘        └────┬─────┘   │
//! │       └─────────────┴──────┬──────┴───────────────────┘         │
//! │                            ▼  ScanResult (completion order)     │
//! │               ┌──────────────────────────┐                      │
//! │               │       Coordinator        │                      │
//! │               │  - progress events       │                      │
//! │               │  - checkpoint batches    │                      │
//! │               └────────────┬─────────────┘                      │
//! └────────────────────────────┼────────────────────────────────────┘
//!                              ▼
//!          ┌─────────────────────────┐   ┌───────────────────┐
//!          │ Checkpoint (JSON/SQLite)│   │ CSV report        │
//!          └─────────────────────────┘   └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! export DATABRICKS_HOST=https://adb-123.azuredatabricks.net
//! export DATABRICKS_TOKEN=dapi...
//!
//! # Scan everyone in users.txt
//! home-census --users-file users.txt -o census.csv
//!
//! # Continue after an interruption
//! home-census --users-file users.txt -o census.csv --resume
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod listing;
pub mod progress;
pub mod report;
pub mod retry;
pub mod scanner;
pub mod users;

pub use checkpoint::{open_store, Checkpoint, CheckpointRecord, CheckpointStore};
pub use config::{CensusConfig, CliArgs};
pub use error::{CensusError, Result};
pub use report::FinalReport;
pub use scanner::{Coordinator, CoordinatorOptions, RunOutcome, ScanResult};
