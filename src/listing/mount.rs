//! Local FUSE-mount lister for DBFS
//!
//! Cluster nodes expose DBFS under a local mount point (normally `/dbfs`).
//! When the mount exists it is read directly with `std::fs`, which avoids the
//! REST rate limit entirely. Paths handed to and returned from this lister
//! are namespace paths; the mount prefix never leaks out.

use crate::error::{ListError, ListResult};
use crate::listing::{DirectoryLister, ListEntry};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::trace;

/// Default DBFS mount point on cluster nodes
pub const DEFAULT_DBFS_MOUNT: &str = "/dbfs";

/// Lists DBFS through a locally mounted filesystem
#[derive(Debug, Clone)]
pub struct MountLister {
    mount: PathBuf,
}

impl MountLister {
    /// Create a lister rooted at `mount`
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
        }
    }

    fn local_path(&self, path: &str) -> PathBuf {
        self.mount.join(path.trim_start_matches('/'))
    }

    fn map_io_error(path: &str, error: std::io::Error) -> ListError {
        match error.kind() {
            ErrorKind::NotFound => ListError::NotFound { path: path.into() },
            ErrorKind::PermissionDenied => ListError::PermissionDenied { path: path.into() },
            ErrorKind::InvalidInput | ErrorKind::InvalidData => ListError::Malformed {
                path: path.into(),
                reason: error.to_string(),
            },
            _ => ListError::Network {
                path: path.into(),
                reason: error.to_string(),
            },
        }
    }
}

impl DirectoryLister for MountLister {
    fn name(&self) -> &str {
        "dbfs-mount"
    }

    fn is_available(&mut self) -> bool {
        self.mount.is_dir()
    }

    fn list(&mut self, path: &str) -> ListResult<Vec<ListEntry>> {
        let local = self.local_path(path);
        trace!(path, local = %local.display(), "Reading mounted directory");

        let reader = std::fs::read_dir(&local).map_err(|e| Self::map_io_error(path, e))?;
        let base = path.trim_end_matches('/');
        let mut entries = Vec::new();

        for item in reader {
            let item = item.map_err(|e| Self::map_io_error(path, e))?;
            let name = item.file_name().to_string_lossy().into_owned();
            let child = format!("{}/{}", base, name);

            // A child removed between readdir and stat is simply gone
            let metadata = match item.metadata() {
                Ok(m) => m,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Self::map_io_error(&child, e)),
            };

            if metadata.is_dir() {
                entries.push(ListEntry::directory(child));
            } else {
                entries.push(ListEntry::file(child, Some(metadata.len())));
            }
        }

        Ok(entries)
    }
}
