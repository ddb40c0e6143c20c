//! In-memory scripted lister
//!
//! Serves a fixed directory tree and replays scripted failures. Clones share
//! their state, so one scripted namespace can back every worker in a run and
//! call counts stay global.

use crate::error::{ListError, ListResult};
use crate::listing::{DirectoryLister, ListEntry};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct Script {
    /// Failures handed out once each, in order, before the path succeeds
    transient: HashMap<String, VecDeque<ListError>>,
    /// Failures returned on every call
    permanent: HashMap<String, ListError>,
}

/// Directory lister backed by an in-memory tree
#[derive(Debug, Clone)]
pub struct MemoryLister {
    name: String,
    available: bool,
    tree: HashMap<String, Vec<ListEntry>>,
    latency: HashMap<String, Duration>,
    script: Arc<Mutex<Script>>,
    calls: Arc<AtomicU64>,
}

impl MemoryLister {
    /// Create an empty, available lister
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: true,
            tree: HashMap::new(),
            latency: HashMap::new(),
            script: Arc::new(Mutex::new(Script::default())),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Report this strategy as unavailable
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Register a directory and its children
    ///
    /// Child directories are registered too (empty) unless already present.
    pub fn with_dir(mut self, path: &str, children: Vec<ListEntry>) -> Self {
        for child in children.iter().filter(|c| c.is_directory) {
            self.tree.entry(child.path.clone()).or_default();
        }
        self.tree.entry(path.to_string()).or_default().extend(children);
        self
    }

    /// Register a directory holding `count` files of `size` bytes each
    pub fn with_files(self, dir: &str, count: usize, size: u64) -> Self {
        let files = (0..count)
            .map(|i| ListEntry::file(format!("{}/file{}", dir.trim_end_matches('/'), i), Some(size)))
            .collect();
        self.with_dir(dir, files)
    }

    /// Fail the next `times` listings of `path` with `error`
    pub fn fail_times(self, path: &str, error: ListError, times: usize) -> Self {
        {
            let mut script = self.script.lock();
            let queue = script.transient.entry(path.to_string()).or_default();
            queue.extend(std::iter::repeat(error).take(times));
        }
        self
    }

    /// Fail every listing of `path` with `error`
    pub fn fail_always(self, path: &str, error: ListError) -> Self {
        self.script.lock().permanent.insert(path.to_string(), error);
        self
    }

    /// Sleep before answering listings of `path`
    pub fn with_latency(mut self, path: &str, latency: Duration) -> Self {
        self.latency.insert(path.to_string(), latency);
        self
    }

    /// Total listing calls served, across all clones
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl DirectoryLister for MemoryLister {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&mut self) -> bool {
        self.available
    }

    fn list(&mut self, path: &str) -> ListResult<Vec<ListEntry>> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency.get(path) {
            thread::sleep(*latency);
        }

        {
            let mut script = self.script.lock();
            if let Some(error) = script.permanent.get(path) {
                return Err(error.clone());
            }
            if let Some(error) = script.transient.get_mut(path).and_then(VecDeque::pop_front) {
                return Err(error);
            }
        }

        self.tree
            .get(path)
            .cloned()
            .ok_or_else(|| ListError::NotFound { path: path.into() })
    }
}
