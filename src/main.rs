//! sessync CLI entry point.

use clap::Parser;
use sessync::cli::commands;
use sessync::cli::{Cli, Commands};
use sessync::config::{hook_log_path, resolve_home};
use sessync::error::Error;
use std::fs::{self, OpenOptions};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if cli.is_hook_run() {
        init_hook_tracing(&cli);
    } else {
        init_tracing(cli.verbose, cli.quiet);
    }

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn filter_for(verbose: u8, default: &str) -> EnvFilter {
    // Honor RUST_LOG if set, otherwise use verbosity flag
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    match verbose {
        0 => EnvFilter::new(default),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug,rusqlite=info"),
        _ => EnvFilter::new("trace"),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbose, "warn"))
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Hook runs must not write to the host's terminal, so logs go to
/// `<home>/logs/hooks.log`. If the file cannot be opened, nothing is logged.
fn init_hook_tracing(cli: &Cli) {
    let Ok(home) = resolve_home(cli.home.as_deref()) else {
        return;
    };
    let path = hook_log_path(&home);
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter_for(cli.verbose, "info"))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let home = cli.home.as_deref();
    match &cli.command {
        Commands::Sync(args) => commands::sync::execute(args, home, json),
        Commands::Status => commands::status::execute(home, json),
        Commands::Version => commands::version::execute(json),
    }
}
