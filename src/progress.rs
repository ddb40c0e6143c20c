//! Progress reporting for the census
//!
//! Shows a `[pos/len]` bar fed by coordinator progress events, plus the
//! header and summary printed around a run.

use crate::report::ReportSummary;
use crate::scanner::{InterruptionSummary, ProgressEvent, ScanStatus};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays per-user completions
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter for `total` users, `done` of them already recorded
    pub fn new(total: u64, done: u64) -> Self {
        let bar = ProgressBar::new(total);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress template")
                .progress_chars("=> ")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.set_position(done);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Record one completed user
    pub fn update(&self, event: &ProgressEvent) {
        let result = &event.result;
        let status = match result.status {
            ScanStatus::Success => style(result.status.as_str()).green(),
            ScanStatus::Empty => style(result.status.as_str()).dim(),
            ScanStatus::Error => style(result.status.as_str()).red(),
        };

        self.bar.set_position(event.sequence_index);
        self.bar.set_message(format!(
            "{} | {} files | {} | {}",
            event.username,
            format_number(result.file_count),
            format_size(result.total_size, BINARY),
            status,
        ));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the census results
pub fn print_summary(summary: &ReportSummary, duration: Duration, report_path: &str, complete: bool) {
    let duration_secs = duration.as_secs_f64();
    let title = if complete {
        style("Census Complete").green().bold()
    } else {
        style("Census Incomplete").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Users:").bold(), format_number(summary.users));
    println!(
        "  {} {} success, {} empty",
        style("Status:").bold(),
        format_number(summary.success),
        format_number(summary.empty)
    );
    println!("  {} {}", style("Files:").bold(), format_number(summary.total_files));
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(summary.total_bytes, BINARY)
    );
    println!("  {} {:.1}s", style("Duration:").bold(), duration_secs);
    if summary.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(summary.errors)
        );
    }
    println!("  {} {}", style("Report:").bold(), report_path);
    println!();
}

/// Print how to continue an interrupted run
pub fn print_resume_hint(interruption: &InterruptionSummary, checkpoint: &str) {
    println!(
        "{} {}/{} users recorded (last: {})",
        style("Interrupted:").yellow().bold(),
        format_number(interruption.completed),
        format_number(interruption.total),
        interruption.last_username.as_deref().unwrap_or("none")
    );
    println!(
        "  Rerun with {} {} to continue",
        style("--resume --checkpoint").bold(),
        checkpoint
    );
    println!();
}

/// Print a header at the start of the census
pub fn print_header(workspace: &str, users: usize, workers: usize, checkpoint: &str) {
    println!();
    println!(
        "{} {}",
        style("home-census").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Workspace:").bold(), workspace);
    println!("  {} {}", style("Users:").bold(), format_number(users as u64));
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Checkpoint:").bold(), checkpoint);
    println!();
}
