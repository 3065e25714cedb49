//! Sync command implementation.
//!
//! Builds an orchestrator for the selected source and runs it on a
//! single-threaded tokio runtime. Hook runs go through the concurrency
//! guard, print nothing, and always exit successfully.

use colored::Colorize;
use std::path::Path;
use tracing::error;

use crate::cli::{SourceKind, SyncArgs};
use crate::config::{
    config_path, load_config, lock_path, resolve_api_url, resolve_claude_dir, resolve_cursor_dir,
    resolve_home, resolve_token, ConfigStore,
};
use crate::error::{Error, Result};
use crate::readers::{ClaudeReader, CursorReader, SessionSource};
use crate::sync::{
    run_hook_sync, HookLock, HttpTransport, Orchestrator, SyncOptions, SyncOutcome, SyncReport,
    UploadTransport, MIN_SESSION_SECS,
};

/// Execute the sync command.
///
/// # Errors
///
/// Interactive runs return the first failure. Hook runs never error.
pub fn execute(args: &SyncArgs, home: Option<&Path>, json: bool) -> Result<()> {
    let options = args.to_options();

    if options.is_silent() {
        if let Err(e) = run_sync(args, &options, home) {
            error!(
                hook = options.hook.as_deref().unwrap_or_default(),
                code = e.error_code().as_str(),
                error = %e,
                "Hook sync could not start"
            );
        }
        return Ok(());
    }

    let report = run_sync(args, &options, home)?;
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn run_sync(args: &SyncArgs, options: &SyncOptions, home: Option<&Path>) -> Result<SyncReport> {
    let home = resolve_home(home)?;
    let config_file = config_path(&home);
    let config = load_config(&config_file)?;

    let transport = HttpTransport::new(resolve_api_url(&config), resolve_token(&config));
    let store = ConfigStore::new(&config_file);
    let lock = HookLock::new(lock_path(&home));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    match args.source {
        SourceKind::Claude => {
            let reader = ClaudeReader::new(resolve_claude_dir(args.claude_dir.as_deref())?);
            rt.block_on(run(Orchestrator::new(reader, transport, store), &lock, options))
        }
        SourceKind::Cursor => {
            let reader = CursorReader::new(resolve_cursor_dir(args.cursor_dir.as_deref())?);
            rt.block_on(run(Orchestrator::new(reader, transport, store), &lock, options))
        }
    }
}

async fn run<S, T>(
    orchestrator: Orchestrator<S, T, ConfigStore>,
    lock: &HookLock,
    options: &SyncOptions,
) -> Result<SyncReport>
where
    S: SessionSource,
    T: UploadTransport,
{
    if options.is_silent() {
        run_hook_sync(&orchestrator, lock, options).await
    } else {
        orchestrator.run(options).await
    }
}

fn print_report(report: &SyncReport) {
    let scope = report.project.as_deref().unwrap_or("all projects");

    match &report.outcome {
        SyncOutcome::Uploaded => {
            println!(
                "{} Uploaded {} session(s) from {} in {} batch(es)",
                "✓".green().bold(),
                report.sessions_uploaded,
                scope.bold(),
                report.batches
            );
            println!("  Created:    {}", report.created);
            if report.duplicates > 0 {
                println!("  Duplicates: {}", report.duplicates.to_string().dimmed());
            }
            if let Some(streak) = &report.streak {
                println!(
                    "  Streak:     {} day(s) {}",
                    streak.current.to_string().yellow().bold(),
                    format!("(longest {})", streak.longest).dimmed()
                );
            }
        }
        SyncOutcome::DryRun => {
            println!(
                "{} {} session(s) from {} would be uploaded in {} batch(es)",
                "Dry run:".cyan().bold(),
                report.sessions_uploaded,
                scope.bold(),
                report.batches
            );
            for session in &report.preview {
                println!(
                    "  {} {} {} {}",
                    session.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    session.project_name.bold(),
                    format!("{}m", session.duration / 60).yellow(),
                    format!("{} messages", session.data.message_count).dimmed()
                );
            }
        }
        SyncOutcome::NothingToSync => {
            println!("No new sessions to sync for {scope}.");
        }
        SyncOutcome::LockBusy => {
            println!("{}", "Another sync is already running.".yellow());
        }
        SyncOutcome::Failed { stage, message } => {
            println!("{} Sync failed while {stage}: {message}", "✗".red().bold());
        }
    }

    if report.sessions_filtered > 0 {
        println!(
            "  {}",
            format!(
                "{} session(s) shorter than {} minutes skipped",
                report.sessions_filtered,
                MIN_SESSION_SECS / 60
            )
            .dimmed()
        );
    }
    if report.skipped_files > 0 || report.skipped_records > 0 {
        println!(
            "  {}",
            format!(
                "{} unreadable file(s), {} malformed record(s) ignored",
                report.skipped_files, report.skipped_records
            )
            .dimmed()
        );
    }
}
