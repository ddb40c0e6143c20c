//! Configuration types for home-census
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::checkpoint::DEFAULT_CHECKPOINT_PATH;
use crate::error::ConfigError;
use crate::listing::mount::DEFAULT_DBFS_MOUNT;
use crate::listing::DEFAULT_MAX_DEPTH;
use crate::retry::RetryConfig;
use crate::scanner::coordinator::{CoordinatorOptions, DEFAULT_ABORT_AFTER};
use crate::scanner::partition::DEFAULT_MAX_UNITS;
use crate::users::load_usernames;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Maximum traversal depth
const MAX_DEPTH: u32 = 64;

/// Maximum attempts per listing call
const MAX_RETRIES: u32 = 20;

/// Per-user file inventory across DBFS and Workspace home directories
#[derive(Parser, Debug, Clone)]
#[command(
    name = "home-census",
    version,
    about = "Per-user file inventory across DBFS and Workspace home directories",
    long_about = "Counts files and bytes under /Users/<name> in both DBFS and the Workspace for \
                  every listed user, in parallel, with retry/backoff under API rate limits.\n\n\
                  Completed users are checkpointed as they finish; rerun with --resume to \
                  continue an interrupted census.",
    after_help = "EXAMPLES:\n    \
        home-census --users-file users.txt -o census.csv\n    \
        home-census alice@corp.com bob@corp.com -w 8\n    \
        home-census --users-file users.txt --checkpoint census.db --resume"
)]
pub struct CliArgs {
    /// Usernames to scan
    #[arg(value_name = "USERNAME")]
    pub usernames: Vec<String>,

    /// File with one username per line ('#' starts a comment)
    #[arg(short = 'u', long, value_name = "FILE")]
    pub users_file: Option<PathBuf>,

    /// Workspace URL
    #[arg(long, env = "DATABRICKS_HOST", value_name = "URL")]
    pub workspace_url: Option<String>,

    /// Personal access token
    #[arg(long, env = "DATABRICKS_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Maximum number of work units
    #[arg(long, default_value_t = DEFAULT_MAX_UNITS, value_name = "NUM")]
    pub max_units: usize,

    /// Maximum directory depth below each home directory
    #[arg(short = 'd', long, default_value_t = DEFAULT_MAX_DEPTH, value_name = "NUM")]
    pub max_depth: u32,

    /// Checkpoint file (.db/.sqlite for SQLite, otherwise JSON)
    #[arg(long, default_value = DEFAULT_CHECKPOINT_PATH, value_name = "FILE")]
    pub checkpoint: PathBuf,

    /// Completed users per checkpoint write
    #[arg(long, default_value = "1", value_name = "NUM")]
    pub checkpoint_batch: usize,

    /// Continue from an existing checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Output CSV report
    #[arg(short, long, default_value = "home_census.csv", value_name = "FILE")]
    pub output: PathBuf,

    /// Attempts per listing call before giving up
    #[arg(long, default_value = "5", value_name = "NUM")]
    pub retries: u32,

    /// Request timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    pub timeout: u64,

    /// Consecutive users with neither API reachable before aborting the run (0 disables)
    #[arg(long, default_value_t = DEFAULT_ABORT_AFTER, value_name = "NUM")]
    pub abort_after: u32,

    /// Local DBFS mount point, tried before the REST API
    #[arg(long, default_value = DEFAULT_DBFS_MOUNT, value_name = "PATH")]
    pub dbfs_mount: PathBuf,

    /// Never read DBFS through the local mount
    #[arg(long)]
    pub no_mount: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // Listing is I/O bound
    num_cpus::get() * 2
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CensusConfig {
    /// Ordered, deduplicated usernames
    pub usernames: Vec<String>,

    /// Workspace base URL
    pub workspace_url: String,

    /// Access token
    pub token: String,

    /// Number of worker threads
    pub worker_count: usize,

    /// Work unit cap
    pub max_units: usize,

    /// Maximum traversal depth
    pub max_depth: u32,

    /// Checkpoint file
    pub checkpoint_path: PathBuf,

    /// Completed users per checkpoint write
    pub checkpoint_batch: usize,

    /// Continue from the checkpoint
    pub resume: bool,

    /// CSV report path
    pub output_path: PathBuf,

    /// Retry and pacing parameters
    pub retry: RetryConfig,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Consecutive unreachable users before aborting (0 disables)
    pub abort_after: u32,

    /// DBFS mount to try first, if any
    pub dbfs_mount: Option<PathBuf>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl CensusConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let workspace_url = args
            .workspace_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::MissingCredentials("set --workspace-url or DATABRICKS_HOST".into())
            })?;
        let token = args
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredentials("set --token or DATABRICKS_TOKEN".into()))?;

        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.max_units == 0 {
            return Err(ConfigError::InvalidUnitCap { cap: args.max_units });
        }

        if args.max_depth == 0 || args.max_depth > MAX_DEPTH {
            return Err(ConfigError::InvalidMaxDepth {
                depth: args.max_depth,
                max: MAX_DEPTH,
            });
        }

        if args.retries == 0 || args.retries > MAX_RETRIES {
            return Err(ConfigError::InvalidRetryCount {
                count: args.retries,
                max: MAX_RETRIES,
            });
        }

        // A checkpoint is never silently reset
        if args.checkpoint.exists() && !args.resume {
            return Err(ConfigError::CheckpointExists {
                path: args.checkpoint.clone(),
            });
        }

        // Validate output path
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        let usernames = load_usernames(&args.usernames, args.users_file.as_deref())?;

        let retry = RetryConfig {
            max_attempts: args.retries,
            ..RetryConfig::default()
        };

        Ok(Self {
            usernames,
            workspace_url,
            token,
            worker_count: args.workers,
            max_units: args.max_units,
            max_depth: args.max_depth,
            checkpoint_path: args.checkpoint,
            checkpoint_batch: args.checkpoint_batch.max(1),
            resume: args.resume,
            output_path: args.output,
            retry,
            request_timeout: Duration::from_secs(args.timeout.max(1)),
            abort_after: args.abort_after,
            dbfs_mount: (!args.no_mount).then_some(args.dbfs_mount),
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Parameters handed to the coordinator
    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            workers: self.worker_count,
            max_units: self.max_units,
            checkpoint_batch: self.checkpoint_batch,
            abort_after: self.abort_after,
            resume: self.resume,
        }
    }
}
