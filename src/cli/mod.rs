//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::sync::SyncOptions;

pub mod commands;

/// sessync - upload sanitized AI coding sessions for analysis
#[derive(Parser, Debug)]
#[command(name = "sessync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (default: $SESSYNC_HOME or ~/.sessync)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Hook-triggered runs log to a file and print nothing.
    #[must_use]
    pub fn is_hook_run(&self) -> bool {
        matches!(&self.command, Commands::Sync(args) if args.hook.is_some())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload new sessions
    Sync(SyncArgs),

    /// Show configuration and sync progress
    Status,

    /// Print version information
    Version,
}

/// Which assistant's sessions to read.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Claude Code JSONL logs
    #[default]
    Claude,
    /// Cursor's state database
    Cursor,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Sync every project with no time filter (overrides --project)
    #[arg(long)]
    pub all: bool,

    /// Restrict to one project directory
    #[arg(long, value_name = "DIR")]
    pub project: Option<String>,

    /// Hook event that triggered this run (enables silent mode)
    #[arg(long, value_name = "TRIGGER")]
    pub hook: Option<String>,

    /// Session source
    #[arg(long, value_enum, default_value_t)]
    pub source: SourceKind,

    /// First sync during setup; no qualifying sessions is not an error
    #[arg(long)]
    pub initial: bool,

    /// Sanitize and show what would be uploaded without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Claude Code projects directory (default: ~/.claude/projects)
    #[arg(long, value_name = "DIR")]
    pub claude_dir: Option<PathBuf>,

    /// Cursor user data directory
    #[arg(long, value_name = "DIR")]
    pub cursor_dir: Option<PathBuf>,
}

impl SyncArgs {
    #[must_use]
    pub fn to_options(&self) -> SyncOptions {
        SyncOptions {
            all_projects: self.all,
            project_dir: self.project.clone(),
            hook: self.hook.clone(),
            dry_run: self.dry_run,
            initial_sync: self.initial,
        }
    }
}
