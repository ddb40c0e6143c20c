//! Namespace scanner - recursive listing of one user's subtree
//!
//! Walks a single namespace depth-first from a root path, aggregating item
//! count and size. Every listing call goes through the worker's
//! [`RetryPolicy`]. The walk:
//! - never lists a path twice (malformed listings can point back up the tree)
//! - stops descending below `max_depth`; deeper directories are counted as
//!   truncated, not as errors
//! - skips subdirectories that vanished or are unreadable
//! - fails the namespace when any other listing gives up

use crate::error::{ListError, ListResult};
use crate::listing::{DirectoryLister, Namespace};
use crate::retry::{RetryPolicy, RetryStats};
use crate::scanner::types::{NamespaceOutcome, NamespaceTally};
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Pending directory on the traversal stack
struct DirTask {
    path: String,
    depth: u32,
}

/// Scans one namespace with a selected listing strategy
pub struct NamespaceScanner {
    namespace: Namespace,
    lister: Box<dyn DirectoryLister>,
    retry: RetryPolicy,
    max_depth: u32,
}

impl NamespaceScanner {
    /// Create a scanner for `namespace`
    pub fn new(
        namespace: Namespace,
        lister: Box<dyn DirectoryLister>,
        retry: RetryPolicy,
        max_depth: u32,
    ) -> Self {
        Self {
            namespace,
            lister,
            retry,
            max_depth,
        }
    }

    /// Namespace this scanner covers
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Name of the listing strategy in use
    pub fn strategy(&self) -> &str {
        self.lister.name()
    }

    /// Retry counters accumulated by this scanner
    pub fn retry_stats(&self) -> RetryStats {
        self.retry.stats()
    }

    /// Scan the subtree under `root`
    ///
    /// Listing failures are folded into the tally's outcome. The only error
    /// returned is [`ListError::Cancelled`], in which case the partial tally
    /// is discarded.
    pub fn scan(&mut self, root: &str) -> ListResult<NamespaceTally> {
        let Self {
            namespace,
            lister,
            retry,
            max_depth,
        } = self;
        let size_mode = namespace.size_mode();

        let mut tally = NamespaceTally::with_outcome(NamespaceOutcome::Ok);
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = vec![DirTask {
            path: root.to_string(),
            depth: 0,
        }];
        visited.insert(root.to_string());

        while let Some(task) = stack.pop() {
            let entries = match retry.execute(&task.path, || lister.list(&task.path)) {
                Ok(entries) => entries,
                Err(e @ ListError::Cancelled { .. }) => return Err(e),
                Err(e) if task.depth == 0 => {
                    tally.outcome = match e {
                        ListError::NotFound { .. } => NamespaceOutcome::NotFound,
                        other => failed(&other),
                    };
                    debug!(namespace = %namespace, root, outcome = ?tally.outcome, "Root not listable");
                    return Ok(tally);
                }
                Err(e) if e.is_recoverable() => {
                    tally.skipped += 1;
                    debug!(namespace = %namespace, path = %task.path, error = %e, "Directory skipped");
                    continue;
                }
                Err(e) => {
                    warn!(namespace = %namespace, path = %task.path, error = %e, "Directory failed");
                    tally.outcome = failed(&e);
                    return Ok(tally);
                }
            };

            tally.dirs += 1;
            trace!(namespace = %namespace, path = %task.path, entries = entries.len(), "Directory listed");

            for entry in entries {
                if entry.is_directory {
                    let depth = task.depth + 1;
                    if depth > *max_depth {
                        tally.truncated += 1;
                        continue;
                    }
                    if visited.insert(entry.path.clone()) {
                        stack.push(DirTask {
                            path: entry.path,
                            depth,
                        });
                    }
                } else {
                    tally.count += 1;
                    tally.size += size_mode.item_size(&entry);
                }
            }
        }

        if tally.truncated > 0 {
            debug!(
                namespace = %namespace,
                root,
                truncated = tally.truncated,
                max_depth = *max_depth,
                "Depth limit reached"
            );
        }

        Ok(tally)
    }
}

/// Outcome for a namespace that gave up on `error`
fn failed(error: &ListError) -> NamespaceOutcome {
    if error.is_connectivity_failure() {
        NamespaceOutcome::Unreachable(error.to_string())
    } else {
        NamespaceOutcome::Failed(error.to_string())
    }
}
