//! home-census - Per-user file inventory across DBFS and the Workspace
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use home_census::checkpoint::open_store;
use home_census::config::{CensusConfig, CliArgs};
use home_census::progress::{print_header, print_resume_hint, print_summary, ProgressReporter};
use home_census::scanner::{remote_user_scanner, Coordinator, RunOutcome};
use home_census::CensusError;
use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = CensusConfig::from_args(args).context("Invalid configuration")?;

    if config.resume && !config.checkpoint_path.exists() {
        warn!(
            path = %config.checkpoint_path.display(),
            "No checkpoint to resume from, starting fresh"
        );
    }

    let checkpoint_display = config.checkpoint_path.display().to_string();
    let store = open_store(&config.checkpoint_path).context("Failed to open checkpoint")?;

    if config.show_progress {
        print_header(
            &config.workspace_url,
            config.usernames.len(),
            config.worker_count,
            &checkpoint_display,
        );
    }

    let mut coordinator = Coordinator::new(config.coordinator_options(), store);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing in-flight users...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Create progress reporter, starting after users already checkpointed
    let progress = if config.show_progress {
        let recorded = coordinator
            .recorded_count(&config.usernames)
            .context("Failed to read checkpoint")?;
        Some(ProgressReporter::new(config.usernames.len() as u64, recorded))
    } else {
        None
    };

    if let Some(ref p) = progress {
        p.set_status("Selecting listing strategies...");
    }

    let shutdown = coordinator.shutdown_flag();
    let result = coordinator.run_with_progress(
        &config.usernames,
        |id| remote_user_scanner(id, &config, &shutdown),
        |event| {
            if let Some(ref p) = progress {
                p.update(event);
            }
        },
    );

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish("Census aborted");
            }
            if let CensusError::Aborted { .. } = e {
                eprintln!(
                    "Completed users are saved; rerun with --resume --checkpoint {} to continue",
                    checkpoint_display
                );
            }
            return Err(e).context("Census failed");
        }
    };

    // Finish progress
    if let Some(ref p) = progress {
        if outcome.is_complete() {
            p.finish("Census completed");
        } else {
            p.finish("Census interrupted");
        }
    }

    write_report(&config, &outcome)?;

    let summary = outcome.report.summary();
    print_summary(
        &summary,
        outcome.duration,
        &config.output_path.display().to_string(),
        outcome.is_complete(),
    );

    if let Some(ref interruption) = outcome.interruption {
        print_resume_hint(interruption, &checkpoint_display);
        info!(
            completed = interruption.completed,
            total = interruption.total,
            "Census was interrupted before completion"
        );
    }

    if summary.errors > 0 {
        info!(errors = summary.errors, "Census completed with per-user errors");
    }

    Ok(())
}

fn write_report(config: &CensusConfig, outcome: &RunOutcome) -> Result<()> {
    let file = File::create(&config.output_path)
        .with_context(|| format!("Failed to create report {}", config.output_path.display()))?;
    outcome
        .report
        .write_csv(BufWriter::new(file))
        .with_context(|| format!("Failed to write report {}", config.output_path.display()))?;

    info!(
        path = %config.output_path.display(),
        rows = outcome.report.len(),
        resumed = outcome.resumed,
        scanned = outcome.newly_scanned,
        "Report written"
    );
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("home_census=debug,warn")
    } else {
        EnvFilter::new("home_census=info,warn")
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => filter,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
