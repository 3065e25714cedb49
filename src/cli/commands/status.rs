//! Status command implementation.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use crate::config::{
    config_path, load_config, lock_path, resolve_api_url, resolve_home, resolve_token, LastSync,
    SyncBoundary,
};
use crate::error::Result;
use crate::sync::{HookLock, LockInfo};

/// Output for status command.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput {
    home: String,
    api_url: String,
    authenticated: bool,
    projects: Vec<ProjectStatus>,
    last_sync: Option<LastSync>,
    hook_lock: Option<LockInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectStatus {
    path: String,
    #[serde(flatten)]
    boundary: SyncBoundary,
}

/// Execute status command.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read.
pub fn execute(home: Option<&Path>, json: bool) -> Result<()> {
    let home = resolve_home(home)?;
    let config = load_config(&config_path(&home))?;

    let output = StatusOutput {
        home: home.display().to_string(),
        api_url: resolve_api_url(&config),
        authenticated: resolve_token(&config).is_some(),
        projects: config
            .sync_boundaries
            .iter()
            .map(|(path, boundary)| ProjectStatus {
                path: path.clone(),
                boundary: boundary.clone(),
            })
            .collect(),
        last_sync: config.last_sync.clone(),
        hook_lock: HookLock::new(lock_path(&home)).holder(),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    print_status(&output);
    Ok(())
}

fn print_status(output: &StatusOutput) {
    println!("{}", "sessync status".cyan().bold());
    println!();
    println!("Home:    {}", output.home);
    println!("API:     {}", output.api_url);
    if output.authenticated {
        println!("Token:   {}", "configured".green());
    } else {
        println!("Token:   {}", "missing (set SESSYNC_TOKEN)".red());
    }
    println!();

    if output.projects.is_empty() {
        println!("No projects synced yet.");
    } else {
        println!("{}", "Projects".cyan().bold());
        for project in &output.projects {
            let b = &project.boundary;
            println!(
                "  {} {} {}",
                b.project_display_name.bold(),
                format!("{} session(s)", b.session_count).yellow(),
                format!("through {}", short_time(b.newest_synced_timestamp)).dimmed()
            );
            println!("    {}", project.path.dimmed());
        }
    }

    if let Some(last) = &output.last_sync {
        println!();
        println!(
            "Last sync: {} ({} session(s), {})",
            last.label,
            last.sessions,
            short_time(last.at)
        );
    }

    if let Some(lock) = &output.hook_lock {
        println!();
        println!(
            "{} hook sync running (pid {} on {})",
            "●".yellow(),
            lock.pid,
            lock.host
        );
    }
}

fn short_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}
