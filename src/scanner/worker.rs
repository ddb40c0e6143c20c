//! Worker thread logic for parallel user scanning
//!
//! Each worker:
//! - Owns one [`UserScanner`], and with it its own retry and pacing state
//! - Pulls work units from the shared queue
//! - Scans the unit's usernames one after the other
//! - Sends every finished result back to the coordinator
//!
//! The shutdown flag is checked before each user. A user whose scan was
//! cancelled part-way is dropped, never reported.

use crate::error::{ListError, WorkerError};
use crate::scanner::partition::WorkUnit;
use crate::scanner::types::{ScanResult, ScanStatus};
use crate::scanner::user::{UserScan, UserScanner};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace};

/// A finished user, tagged with the worker that scanned it
#[derive(Debug, Clone)]
pub struct CompletedScan {
    /// Worker ID
    pub worker: usize,

    /// Merged result
    pub result: ScanResult,

    /// Neither namespace API could be reached
    pub unreachable: bool,
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Work units taken from the queue
    pub units_taken: AtomicU64,

    /// Users scanned to completion
    pub users_scanned: AtomicU64,

    /// Users that ended with status error
    pub users_failed: AtomicU64,

    /// Files found across all users
    pub files_found: AtomicU64,

    /// Bytes found across all users
    pub bytes_found: AtomicU64,

    /// Remote listing calls, retries included
    pub requests: AtomicU64,

    /// Rate-limited responses seen
    pub rate_limited: AtomicU64,
}

impl WorkerStats {
    fn record_result(&self, result: &ScanResult) {
        self.users_scanned.fetch_add(1, Ordering::Relaxed);
        self.files_found.fetch_add(result.file_count, Ordering::Relaxed);
        self.bytes_found.fetch_add(result.total_size, Ordering::Relaxed);
        if result.status == ScanStatus::Error {
            self.users_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A worker thread that scans work units
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        scanner: UserScanner,
        units: Receiver<WorkUnit>,
        results: Sender<CompletedScan>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("census-{}", id))
            .spawn(move || worker_loop(id, scanner, units, results, shutdown, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: "Worker thread panicked".into(),
                }),
            }
        } else {
            Ok(())
        }
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    mut scanner: UserScanner,
    units: Receiver<WorkUnit>,
    results: Sender<CompletedScan>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) -> Result<(), WorkerError> {
    let (dbfs_strategy, workspace_strategy) = scanner.strategies();
    debug!(
        worker = id,
        dbfs = dbfs_strategy,
        workspace = workspace_strategy,
        "Worker started"
    );

    'units: for unit in units.iter() {
        stats.units_taken.fetch_add(1, Ordering::Relaxed);
        trace!(worker = id, unit = unit.id, users = unit.len(), "Work unit taken");

        for username in &unit.usernames {
            if shutdown.load(Ordering::Relaxed) {
                break 'units;
            }

            let scan = match scanner.scan(username) {
                Ok(scan) => scan,
                Err(ListError::Cancelled { .. }) => {
                    debug!(worker = id, username = %username, "Scan cancelled, result discarded");
                    break 'units;
                }
                Err(e) => UserScan {
                    unreachable: e.is_connectivity_failure(),
                    result: ScanResult::error(username, e.to_string()),
                },
            };

            stats.record_result(&scan.result);
            if results
                .send(CompletedScan {
                    worker: id,
                    result: scan.result,
                    unreachable: scan.unreachable,
                })
                .is_err()
            {
                // Coordinator stopped listening
                break 'units;
            }
        }
    }

    let retry = scanner.retry_stats();
    stats.requests.store(retry.requests, Ordering::Relaxed);
    stats.rate_limited.store(retry.rate_limited, Ordering::Relaxed);

    info!(
        worker = id,
        users = stats.users_scanned.load(Ordering::Relaxed),
        requests = retry.requests,
        retries = retry.retries,
        rate_limited = retry.rate_limited,
        "Worker finished"
    );
    Ok(())
}

/// Aggregate statistics from all workers
///
/// Returns `(users, failed, files, bytes, requests)`.
pub fn aggregate_stats(workers: &[Worker]) -> (u64, u64, u64, u64, u64) {
    let mut users = 0u64;
    let mut failed = 0u64;
    let mut files = 0u64;
    let mut bytes = 0u64;
    let mut requests = 0u64;

    for worker in workers {
        let stats = worker.stats();
        users += stats.users_scanned.load(Ordering::Relaxed);
        failed += stats.users_failed.load(Ordering::Relaxed);
        files += stats.files_found.load(Ordering::Relaxed);
        bytes += stats.bytes_found.load(Ordering::Relaxed);
        requests += stats.requests.load(Ordering::Relaxed);
    }

    (users, failed, files, bytes, requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{MemoryLister, Namespace};
    use crate::retry::{RetryConfig, RetryPolicy};
    use crate::scanner::namespace::NamespaceScanner;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn user_scanner(dbfs: MemoryLister, workspace: MemoryLister) -> UserScanner {
        let retry = || {
            RetryPolicy::new(RetryConfig {
                base_delay: Duration::ZERO,
                min_pacing: Duration::ZERO,
                max_pacing: Duration::ZERO,
                ..RetryConfig::default()
            })
        };
        UserScanner::new(
            NamespaceScanner::new(Namespace::Dbfs, Box::new(dbfs), retry(), 10),
            NamespaceScanner::new(Namespace::Workspace, Box::new(workspace), retry(), 10),
        )
    }

    #[test]
    fn test_worker_scans_all_units() {
        let dbfs = MemoryLister::new("dbfs").with_files("/Users/a", 2, 10);
        let workspace = MemoryLister::new("ws");

        let (unit_tx, unit_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        unit_tx
            .send(WorkUnit {
                id: 0,
                usernames: vec!["a".into(), "b".into()],
            })
            .unwrap();
        drop(unit_tx);

        let worker = Worker::spawn(
            0,
            user_scanner(dbfs, workspace),
            unit_rx,
            result_tx,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        let results: Vec<CompletedScan> = result_rx.iter().collect();
        assert_eq!(worker.stats().users_scanned.load(Ordering::Relaxed), 2);
        worker.join().unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].result.file_count, 2);
        assert_eq!(results[1].result.status, ScanStatus::Empty);
        assert!(results.iter().all(|r| !r.unreachable));
    }

    #[test]
    fn test_worker_stops_on_shutdown() {
        let (unit_tx, unit_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        unit_tx
            .send(WorkUnit {
                id: 0,
                usernames: vec!["a".into()],
            })
            .unwrap();
        drop(unit_tx);

        let worker = Worker::spawn(
            3,
            user_scanner(MemoryLister::new("dbfs"), MemoryLister::new("ws")),
            unit_rx,
            result_tx,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        worker.join().unwrap();
        assert_eq!(result_rx.iter().count(), 0);
    }
}
