//! Final report - one row per requested user, in input order
//!
//! Rows come from the loaded checkpoint and from results produced in this
//! run. The CSV layout is fixed:
//!
//! ```text
//! username,file_count,total_size,total_size_gb,status,file_source,error
//! ```

use crate::checkpoint::Checkpoint;
use crate::scanner::types::{ScanResult, ScanStatus};
use std::collections::HashMap;
use std::io::{self, Write};

/// CSV header line
pub const CSV_HEADER: &str = "username,file_count,total_size,total_size_gb,status,file_source,error";

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Per-status counts and totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub users: u64,
    pub success: u64,
    pub empty: u64,
    pub errors: u64,
    pub total_files: u64,
    pub total_bytes: u64,
}

/// Ordered scan results for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalReport {
    rows: Vec<ScanResult>,
}

impl FinalReport {
    /// Build the report in `usernames` order
    ///
    /// Checkpointed results take precedence over fresh ones for the same
    /// user. Usernames with no result yet (an interrupted run) are left out.
    pub fn assemble(usernames: &[String], checkpoint: &Checkpoint, fresh: &[ScanResult]) -> Self {
        let fresh: HashMap<&str, &ScanResult> =
            fresh.iter().map(|r| (r.username.as_str(), r)).collect();

        let rows = usernames
            .iter()
            .filter_map(|u| checkpoint.get(u).or_else(|| fresh.get(u.as_str()).copied()))
            .cloned()
            .collect();

        Self { rows }
    }

    /// Rows in input order
    pub fn rows(&self) -> &[ScanResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count rows by status and sum files and bytes
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for row in &self.rows {
            summary.users += 1;
            summary.total_files += row.file_count;
            summary.total_bytes += row.total_size;
            match row.status {
                ScanStatus::Success => summary.success += 1,
                ScanStatus::Empty => summary.empty += 1,
                ScanStatus::Error => summary.errors += 1,
            }
        }
        summary
    }

    /// Write the report as CSV, header first
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", CSV_HEADER)?;
        for row in &self.rows {
            writeln!(writer, "{}", csv_line(row))?;
        }
        writer.flush()
    }
}

/// Size in GiB rounded to two decimals
pub fn size_gb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / BYTES_PER_GB)
}

fn csv_line(row: &ScanResult) -> String {
    [
        csv_field(&row.username),
        row.file_count.to_string(),
        row.total_size.to_string(),
        size_gb(row.total_size),
        row.status.to_string(),
        row.source.to_string(),
        csv_field(row.error.as_deref().unwrap_or("")),
    ]
    .join(",")
}

/// Quote a field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
