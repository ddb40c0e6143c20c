//! Listing entry types and namespace definitions
//!
//! These types describe what one directory listing returns and how each
//! namespace turns an entry into a byte count.

use std::fmt;

/// Size charged for every Workspace object
///
/// The Workspace listing protocol carries no size field. This fixed estimate
/// keeps totals comparable with historical inventories and must not change.
pub const ESTIMATED_ITEM_SIZE: u64 = 10 * 1024;

/// Default traversal depth limit below a user's root
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// One entry returned by a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Full path of the entry within its namespace
    pub path: String,

    /// Size in bytes, when the namespace reports one
    pub size: Option<u64>,

    /// Whether the entry is a directory to descend into
    pub is_directory: bool,
}

impl ListEntry {
    /// Create a file entry
    pub fn file(path: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            size,
            is_directory: false,
        }
    }

    /// Create a directory entry
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            is_directory: true,
        }
    }

    /// Last path component
    pub fn name(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }
}

/// How a namespace accounts for item sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    /// Trust the size reported by the listing
    Exact,
    /// Charge a fixed size per item, ignoring any reported size
    Estimated(u64),
}

impl SizeMode {
    /// Bytes to account for a non-directory entry
    pub fn item_size(&self, entry: &ListEntry) -> u64 {
        match self {
            SizeMode::Exact => entry.size.unwrap_or(0),
            SizeMode::Estimated(per_item) => *per_item,
        }
    }
}

/// The two remote hierarchies scanned for every user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// DBFS file store, exact sizes (namespace A)
    Dbfs,
    /// Workspace object tree, estimated sizes (namespace B)
    Workspace,
}

impl Namespace {
    /// Root directory of a user's home in this namespace
    pub fn root_for(&self, username: &str) -> String {
        format!("/Users/{}", username)
    }

    /// Size accounting for this namespace
    pub fn size_mode(&self) -> SizeMode {
        match self {
            Namespace::Dbfs => SizeMode::Exact,
            Namespace::Workspace => SizeMode::Estimated(ESTIMATED_ITEM_SIZE),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Dbfs => write!(f, "dbfs"),
            Namespace::Workspace => write!(f, "workspace"),
        }
    }
}
