//! Census coordinator - orchestrates the parallel user scan
//!
//! The coordinator is responsible for:
//! - Loading the checkpoint and skipping users already recorded
//! - Partitioning the remaining users into work units
//! - Building one user scanner per worker before anything is scanned
//! - Streaming completions to the progress callback and the checkpoint
//! - Run-level aborts and graceful shutdown
//! - Assembling the final report in input order
//!
//! ```text
//!                    ┌─────────────┐
//!   usernames ──────►│ Coordinator │◄──── checkpoint (load / append_batch)
//!                    └──────┬──────┘
//!                 WorkUnits │   ▲ CompletedScan (completion order)
//!                           ▼   │
//!        ┌──────────┬──────────┬──────────┐
//!        │ worker 0 │ worker 1 │ worker N │   one UserScanner each
//!        └──────────┴──────────┴──────────┘
//! ```

use crate::checkpoint::{Checkpoint, CheckpointRecord, CheckpointStore};
use crate::error::{CensusError, Result, WorkerError};
use crate::report::FinalReport;
use crate::scanner::partition::{partition, WorkUnit, DEFAULT_MAX_UNITS};
use crate::scanner::types::{ScanResult, ScanStatus};
use crate::scanner::user::UserScanner;
use crate::scanner::worker::{aggregate_stats, CompletedScan, Worker};
use crossbeam_channel::{bounded, unbounded};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default number of consecutive unreachable users that aborts a run
pub const DEFAULT_ABORT_AFTER: u32 = 50;

/// Run parameters for the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Worker threads
    pub workers: usize,

    /// Cap on the number of work units
    pub max_units: usize,

    /// Results per checkpoint write
    pub checkpoint_batch: usize,

    /// Consecutive users with neither API reachable before aborting (0 disables)
    pub abort_after: u32,

    /// Load the checkpoint and skip recorded users
    pub resume: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            max_units: DEFAULT_MAX_UNITS,
            checkpoint_batch: 1,
            abort_after: DEFAULT_ABORT_AFTER,
            resume: false,
        }
    }
}

/// One completed user, in completion order
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// 1-based position among all completed users, resumed ones included
    pub sequence_index: u64,

    /// Total users requested
    pub total: u64,

    pub username: String,

    pub result: ScanResult,
}

/// Where an interrupted run stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptionSummary {
    /// Users recorded, resumed ones included
    pub completed: u64,

    /// Users requested
    pub total: u64,

    /// Last user completed by this run
    pub last_username: Option<String>,
}

/// Result of a coordinator run
#[derive(Debug)]
pub struct RunOutcome {
    /// Rows for every recorded user, in input order
    pub report: FinalReport,

    /// Users recorded, resumed ones included
    pub completed: u64,

    /// Users scanned by this run
    pub newly_scanned: u64,

    /// Users taken from the checkpoint
    pub resumed: u64,

    /// Remote listing calls made by this run
    pub requests: u64,

    /// Time taken for the run
    pub duration: Duration,

    /// Set when shutdown stopped the run early
    pub interruption: Option<InterruptionSummary>,
}

impl RunOutcome {
    /// Whether every requested user has a row
    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Coordinates the parallel census
pub struct Coordinator {
    /// Run parameters
    options: CoordinatorOptions,

    /// Checkpoint backend
    store: Box<dyn CheckpointStore>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,
}

/// Checkpoint writes batched on the coordinator thread
struct CheckpointBatcher<'a> {
    store: &'a mut dyn CheckpointStore,
    pending: Vec<CheckpointRecord>,
    batch_size: usize,
}

impl<'a> CheckpointBatcher<'a> {
    fn push(&mut self, record: CheckpointRecord) -> Result<()> {
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let added = self.store.append_batch(&self.pending)?;
        debug!(batch = self.pending.len(), added, "Checkpoint flushed");
        self.pending.clear();
        Ok(())
    }
}

impl Coordinator {
    /// Create a coordinator over a checkpoint store
    pub fn new(options: CoordinatorOptions, store: Box<dyn CheckpointStore>) -> Self {
        Self {
            options,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned shutdown flag (signal handlers)
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run options in use
    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Users in `usernames` already in the checkpoint, zero unless resuming
    pub fn recorded_count(&mut self, usernames: &[String]) -> Result<u64> {
        if !self.options.resume {
            return Ok(0);
        }
        let checkpoint = self.store.load()?;
        let unique: HashSet<&str> = usernames.iter().map(String::as_str).collect();
        Ok(unique.into_iter().filter(|u| checkpoint.contains(u)).count() as u64)
    }

    /// Run without a progress callback
    pub fn run<F>(&mut self, usernames: &[String], factory: F) -> Result<RunOutcome>
    where
        F: FnMut(usize) -> Result<UserScanner>,
    {
        self.run_with_progress(usernames, factory, |_| {})
    }

    /// Run the census over `usernames`
    ///
    /// `factory` builds the scanner for worker `id`; it is called for every
    /// worker before any user is scanned, and a failure aborts the run.
    /// `on_progress` sees each completed user in completion order.
    pub fn run_with_progress<F, P>(
        &mut self,
        usernames: &[String],
        mut factory: F,
        mut on_progress: P,
    ) -> Result<RunOutcome>
    where
        F: FnMut(usize) -> Result<UserScanner>,
        P: FnMut(&ProgressEvent),
    {
        let start_time = Instant::now();

        let checkpoint = if self.options.resume {
            self.store.load()?
        } else {
            Checkpoint::new()
        };

        let mut seen = HashSet::new();
        let mut resumed = 0u64;
        let mut remaining: Vec<String> = Vec::new();
        for username in usernames {
            if !seen.insert(username.as_str()) {
                continue;
            }
            if checkpoint.contains(username) {
                resumed += 1;
            } else {
                remaining.push(username.clone());
            }
        }
        let total = seen.len() as u64;

        info!(
            total,
            resumed,
            remaining = remaining.len(),
            checkpoint = %self.store.describe(),
            "Starting census"
        );

        if remaining.is_empty() {
            return Ok(RunOutcome {
                report: FinalReport::assemble(usernames, &checkpoint, &[]),
                completed: resumed,
                newly_scanned: 0,
                resumed,
                requests: 0,
                duration: start_time.elapsed(),
                interruption: None,
            });
        }

        let units = partition(&remaining, self.options.max_units);
        let worker_count = self.options.workers.clamp(1, units.len());

        // Strategy selection happens here; any failure aborts before scanning
        let mut scanners = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            scanners.push(factory(id)?);
        }

        let (unit_tx, unit_rx) = bounded::<WorkUnit>(units.len());
        let unit_count = units.len();
        for unit in units {
            unit_tx
                .send(unit)
                .map_err(|_| CensusError::Worker(WorkerError::QueueSendFailed))?;
        }
        drop(unit_tx);

        let (result_tx, result_rx) = unbounded::<CompletedScan>();
        let mut workers = Vec::with_capacity(worker_count);
        for (id, scanner) in scanners.into_iter().enumerate() {
            match Worker::spawn(
                id,
                scanner,
                unit_rx.clone(),
                result_tx.clone(),
                Arc::clone(&self.shutdown),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    self.shutdown.store(true, Ordering::SeqCst);
                    drop(result_tx);
                    join_all(workers);
                    return Err(e.into());
                }
            }
        }
        drop(result_tx);
        drop(unit_rx);
        info!(workers = workers.len(), units = unit_count, "Workers spawned");

        let mut batcher = CheckpointBatcher {
            store: self.store.as_mut(),
            pending: Vec::new(),
            batch_size: self.options.checkpoint_batch.max(1),
        };
        let mut fresh: Vec<ScanResult> = Vec::with_capacity(remaining.len());
        let mut last_username: Option<String> = None;
        let mut consecutive_errors = 0u32;
        let mut abort_reason: Option<String> = None;
        let mut store_failure: Option<CensusError> = None;

        // Ends once every worker has exited and dropped its sender
        for completed in result_rx.iter() {
            let result = completed.result;

            // Per-user refusals stay error rows; only lost connectivity counts
            if result.status == ScanStatus::Error && completed.unreachable {
                consecutive_errors += 1;
            } else {
                consecutive_errors = 0;
            }

            if store_failure.is_none() {
                if let Err(e) = batcher.push(CheckpointRecord::now(result.clone())) {
                    error!(error = %e, "Checkpoint write failed, stopping workers");
                    self.shutdown.store(true, Ordering::SeqCst);
                    store_failure = Some(e);
                }
            }

            let event = ProgressEvent {
                sequence_index: resumed + fresh.len() as u64 + 1,
                total,
                username: result.username.clone(),
                result: result.clone(),
            };
            on_progress(&event);

            last_username = Some(result.username.clone());
            fresh.push(result);

            let limit = self.options.abort_after;
            if limit > 0 && consecutive_errors >= limit && abort_reason.is_none() {
                let cause = fresh
                    .last()
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "unknown error".into());
                let reason = format!(
                    "{} consecutive users could not reach either API; last error: {}",
                    consecutive_errors, cause
                );
                error!(reason = %reason, "Aborting run");
                self.shutdown.store(true, Ordering::SeqCst);
                abort_reason = Some(reason);
            }
        }

        // Everything completed so far must be durable before returning
        let flushed = if store_failure.is_none() {
            batcher.flush()
        } else {
            Ok(())
        };

        let (_, failed, files, bytes, requests) = aggregate_stats(&workers);
        let join_error = join_all(workers);

        if let Some(e) = store_failure {
            return Err(e);
        }
        flushed?;

        let newly_scanned = fresh.len() as u64;
        let completed = resumed + newly_scanned;
        let duration = start_time.elapsed();

        info!(
            completed,
            total,
            newly_scanned,
            failed,
            files,
            bytes,
            requests,
            duration_secs = duration.as_secs(),
            "Census finished"
        );

        // Workers may have finished everyone before the abort took effect
        if let Some(reason) = abort_reason.filter(|_| completed < total) {
            return Err(CensusError::Aborted {
                completed,
                total,
                last_username,
                reason,
            });
        }

        let interruption = if completed < total {
            if let Some(e) = join_error {
                return Err(e.into());
            }
            warn!(completed, total, "Census interrupted before all users were scanned");
            Some(InterruptionSummary {
                completed,
                total,
                last_username,
            })
        } else {
            None
        };

        Ok(RunOutcome {
            report: FinalReport::assemble(usernames, &checkpoint, &fresh),
            completed,
            newly_scanned,
            resumed,
            requests,
            duration,
            interruption,
        })
    }
}

/// Join workers, returning the first failure
fn join_all(workers: Vec<Worker>) -> Option<WorkerError> {
    let mut first = None;
    for worker in workers {
        let id = worker.id();
        if let Err(e) = worker.join() {
            warn!(worker = id, error = %e, "Worker failed to join cleanly");
            first.get_or_insert(e);
        }
    }
    first
}
