//! Remote directory listing
//!
//! This module provides the strategies used to list one directory of a
//! namespace. A deployment may reach the same namespace in several ways, so
//! strategies are arranged in an ordered [`ListerChain`] and the first one
//! that reports itself available is used for the whole run.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────┐      ┌───────────────────────────┐
//! │   DBFS chain              │      │   Workspace chain         │
//! │   1. MountLister (/dbfs)  │      │   1. WorkspaceRestLister  │
//! │   2. DbfsRestLister       │      │                           │
//! └─────────────┬─────────────┘      └─────────────┬─────────────┘
//!               │ select()                         │ select()
//!               ▼                                  ▼
//!      Box<dyn DirectoryLister>          Box<dyn DirectoryLister>
//!               │                                  │
//!               └──────────► NamespaceScanner ◄────┘
//! ```

pub mod memory;
pub mod mount;
pub mod rest;
pub mod types;

pub use memory::MemoryLister;
pub use mount::MountLister;
pub use rest::{DbfsRestLister, RestClient, WorkspaceRestLister};
pub use types::{ListEntry, Namespace, SizeMode, DEFAULT_MAX_DEPTH, ESTIMATED_ITEM_SIZE};

use crate::error::ListResult;
use tracing::{debug, info};

/// One way of listing directories in a namespace
pub trait DirectoryLister: Send {
    /// Short strategy name for logs
    fn name(&self) -> &str;

    /// Whether this strategy can be used in the current environment
    fn is_available(&mut self) -> bool;

    /// List the immediate children of `path`
    fn list(&mut self, path: &str) -> ListResult<Vec<ListEntry>>;
}

impl<T: DirectoryLister + ?Sized> DirectoryLister for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_available(&mut self) -> bool {
        (**self).is_available()
    }

    fn list(&mut self, path: &str) -> ListResult<Vec<ListEntry>> {
        (**self).list(path)
    }
}

/// Ordered fallback of listing strategies for one namespace
pub struct ListerChain {
    namespace: Namespace,
    strategies: Vec<Box<dyn DirectoryLister>>,
}

impl ListerChain {
    /// Create an empty chain
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            strategies: Vec::new(),
        }
    }

    /// Append a strategy; earlier strategies win
    pub fn with(mut self, lister: impl DirectoryLister + 'static) -> Self {
        self.strategies.push(Box::new(lister));
        self
    }

    /// Namespace this chain lists
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Number of strategies in the chain
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the chain has no strategies
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Pick the first available strategy
    pub fn select(self) -> Option<Box<dyn DirectoryLister>> {
        let namespace = self.namespace;
        for mut lister in self.strategies {
            if lister.is_available() {
                info!(namespace = %namespace, strategy = lister.name(), "Listing strategy selected");
                return Some(lister);
            }
            debug!(namespace = %namespace, strategy = lister.name(), "Listing strategy unavailable");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_picks_first_available() {
        let chain = ListerChain::new(Namespace::Dbfs)
            .with(MemoryLister::new("first").unavailable())
            .with(MemoryLister::new("second"))
            .with(MemoryLister::new("third"));
        assert_eq!(chain.len(), 3);

        let selected = chain.select().expect("a strategy should be available");
        assert_eq!(selected.name(), "second");
    }

    #[test]
    fn test_chain_with_nothing_available() {
        let chain = ListerChain::new(Namespace::Workspace)
            .with(MemoryLister::new("only").unavailable());
        assert!(chain.select().is_none());
        assert!(ListerChain::new(Namespace::Workspace).is_empty());
    }
}
