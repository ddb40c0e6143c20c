//! Parallel per-user scanning
//!
//! This module contains the scanning engine:
//! - [`NamespaceScanner`]: recursive walk of one namespace under one root
//! - [`UserScanner`]: both namespaces for one user, merged into a result
//! - [`partition`]: splitting usernames into work units
//! - [`Worker`]: thread that scans work units
//! - [`Coordinator`]: dispatch, checkpointing and the final report

pub mod coordinator;
pub mod namespace;
pub mod partition;
pub mod types;
pub mod user;
pub mod worker;

pub use coordinator::{
    Coordinator, CoordinatorOptions, InterruptionSummary, ProgressEvent, RunOutcome,
};
pub use namespace::NamespaceScanner;
pub use partition::{partition, WorkUnit};
pub use types::{FileSource, NamespaceOutcome, NamespaceTally, ScanResult, ScanStatus};
pub use user::{merge, UserScan, UserScanner};
pub use worker::{CompletedScan, Worker, WorkerStats};

use crate::config::CensusConfig;
use crate::error::{Result, WorkerError};
use crate::listing::{
    DbfsRestLister, DirectoryLister, ListerChain, MountLister, Namespace, RestClient, WorkspaceRestLister,
};
use crate::retry::RetryPolicy;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Build the scanner for worker `worker_id` against the live APIs
///
/// DBFS is read through the local mount when present, otherwise through the
/// REST API; the Workspace always uses the REST API. Each worker gets its own
/// HTTP client and retry state.
pub fn remote_user_scanner(
    worker_id: usize,
    config: &CensusConfig,
    shutdown: &Arc<AtomicBool>,
) -> Result<UserScanner> {
    let client = RestClient::new(&config.workspace_url, &config.token, config.request_timeout)
        .map_err(|e| WorkerError::InitFailed {
            id: worker_id,
            reason: e.to_string(),
        })?;

    let mut dbfs_chain = ListerChain::new(Namespace::Dbfs);
    if let Some(mount) = &config.dbfs_mount {
        dbfs_chain = dbfs_chain.with(MountLister::new(mount));
    }
    let dbfs_chain = dbfs_chain.with(DbfsRestLister::new(client.clone()));
    let workspace_chain =
        ListerChain::new(Namespace::Workspace).with(WorkspaceRestLister::new(client));

    let policy = || RetryPolicy::new(config.retry.clone()).with_cancel(Arc::clone(shutdown));

    Ok(UserScanner::new(
        NamespaceScanner::new(Namespace::Dbfs, select(dbfs_chain)?, policy(), config.max_depth),
        NamespaceScanner::new(
            Namespace::Workspace,
            select(workspace_chain)?,
            policy(),
            config.max_depth,
        ),
    ))
}

fn select(chain: ListerChain) -> Result<Box<dyn DirectoryLister>> {
    let namespace = chain.namespace();
    chain.select().ok_or_else(|| {
        WorkerError::NoStrategy {
            namespace: namespace.to_string(),
        }
        .into()
    })
}
