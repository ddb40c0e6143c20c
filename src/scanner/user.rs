//! User scanner - one username against both namespaces
//!
//! Scans the user's DBFS home, then the user's Workspace home, and merges the
//! two tallies into a single [`ScanResult`]. The namespaces have no ordering
//! dependency; they run one after the other on the worker thread.

use crate::error::ListResult;
use crate::listing::Namespace;
use crate::retry::RetryStats;
use crate::scanner::namespace::NamespaceScanner;
use crate::scanner::types::{FileSource, NamespaceTally, ScanResult};
use tracing::{debug, warn};

/// One scanned user, as handed back to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserScan {
    pub result: ScanResult,

    /// Neither namespace API could be reached for this user
    pub unreachable: bool,
}

/// Scans users against DBFS and Workspace
pub struct UserScanner {
    dbfs: NamespaceScanner,
    workspace: NamespaceScanner,
}

impl UserScanner {
    /// Pair two namespace scanners
    pub fn new(dbfs: NamespaceScanner, workspace: NamespaceScanner) -> Self {
        debug_assert_eq!(dbfs.namespace(), Namespace::Dbfs);
        debug_assert_eq!(workspace.namespace(), Namespace::Workspace);
        Self { dbfs, workspace }
    }

    /// Listing strategies in use, DBFS first
    pub fn strategies(&self) -> (&str, &str) {
        (self.dbfs.strategy(), self.workspace.strategy())
    }

    /// Combined retry counters of both namespace scanners
    pub fn retry_stats(&self) -> RetryStats {
        let a = self.dbfs.retry_stats();
        let b = self.workspace.retry_stats();
        RetryStats {
            requests: a.requests + b.requests,
            retries: a.retries + b.retries,
            rate_limited: a.rate_limited + b.rate_limited,
            exhausted: a.exhausted + b.exhausted,
        }
    }

    /// Scan one user
    ///
    /// Returns `Err` only when shutdown interrupted the scan; nothing about
    /// the user should be recorded in that case.
    pub fn scan(&mut self, username: &str) -> ListResult<UserScan> {
        let dbfs = self.dbfs.scan(&Namespace::Dbfs.root_for(username))?;
        let workspace = self.workspace.scan(&Namespace::Workspace.root_for(username))?;

        for (namespace, tally) in [(Namespace::Dbfs, &dbfs), (Namespace::Workspace, &workspace)] {
            if let Some(message) = tally.failure() {
                warn!(username, namespace = %namespace, error = message, "Namespace scan failed");
            }
        }

        let result = merge(username, &dbfs, &workspace);
        debug!(
            username,
            files = result.file_count,
            bytes = result.total_size,
            status = %result.status,
            source = %result.source,
            "User scanned"
        );
        Ok(UserScan {
            result,
            unreachable: dbfs.is_unreachable() && workspace.is_unreachable(),
        })
    }
}

/// Merge the DBFS (`a`) and Workspace (`b`) tallies for one user
///
/// A missing root counts as empty. A failed namespace contributes nothing
/// and is not reported: the user is a success when the other namespace has
/// files and empty otherwise. Only when both namespaces failed is the user an
/// error, carrying the DBFS message.
pub fn merge(username: &str, a: &NamespaceTally, b: &NamespaceTally) -> ScanResult {
    let count_a = if a.is_failed() { 0 } else { a.count };
    let count_b = if b.is_failed() { 0 } else { b.count };

    let source = match (count_a > 0, count_b > 0) {
        (true, true) => FileSource::Both,
        (true, false) => FileSource::SourceA,
        (false, true) => FileSource::SourceB,
        (false, false) => FileSource::None,
    };

    if source != FileSource::None {
        let size_a = if count_a > 0 { a.size } else { 0 };
        let size_b = if count_b > 0 { b.size } else { 0 };
        return ScanResult::success(username, count_a + count_b, size_a + size_b, source);
    }

    match (a.failure(), b.failure()) {
        (Some(message), Some(_)) => ScanResult::error(username, message),
        _ => ScanResult::empty(username),
    }
}
