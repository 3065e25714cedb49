//! Configuration management.
//!
//! This module resolves sessync's directories and loads the JSON config file.
//!
//! # Layout
//!
//! Everything lives under one home directory (default `~/.sessync/`):
//! - `config.json` - auth token, API URL, per-project sync boundaries
//! - `hooks.lock` - concurrency guard for hook-triggered runs
//! - `logs/hooks.log` - side-channel log written in hook mode
//!
//! Resolvers follow the same precedence everywhere:
//! explicit flag > environment variable > config file > default.

mod store;

pub use store::{project_key, ConfigStore, LastSync, SyncBoundary, SyncStateStore};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Default upload service.
pub const DEFAULT_API_URL: &str = "https://app.vibe-log.dev";

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessyncConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Keyed by project path.
    #[serde(default)]
    pub sync_boundaries: BTreeMap<String, SyncBoundary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<LastSync>,
}

// ── Directories ──────────────────────────────────────────────

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Resolve the sessync home directory.
///
/// Priority:
/// 1. `explicit` (the `--home` flag)
/// 2. `SESSYNC_HOME` environment variable
/// 3. `~/.sessync`
pub fn resolve_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(home) = non_empty_env("SESSYNC_HOME") {
        return Ok(PathBuf::from(home));
    }
    Ok(home_dir()?.join(".sessync"))
}

#[must_use]
pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.json")
}

#[must_use]
pub fn lock_path(home: &Path) -> PathBuf {
    home.join("hooks.lock")
}

#[must_use]
pub fn hook_log_path(home: &Path) -> PathBuf {
    home.join("logs").join("hooks.log")
}

/// Resolve Claude Code's `projects` directory.
///
/// Priority: `explicit` > `$CLAUDE_CONFIG_DIR/projects` > `~/.claude/projects`.
pub fn resolve_claude_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(dir) = non_empty_env("CLAUDE_CONFIG_DIR") {
        return Ok(PathBuf::from(dir).join("projects"));
    }
    Ok(home_dir()?.join(".claude").join("projects"))
}

/// Resolve Cursor's `User` data directory.
///
/// Defaults to the platform config dir:
/// - macOS: `~/Library/Application Support/Cursor/User`
/// - Linux: `~/.config/Cursor/User`
/// - Windows: `%APPDATA%\Cursor\User`
pub fn resolve_cursor_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    directories::BaseDirs::new()
        .map(|b| b.config_dir().join("Cursor").join("User"))
        .ok_or_else(|| Error::Config("Could not determine config directory".into()))
}

/// Resolve the API token. Priority: `SESSYNC_TOKEN` > config.
#[must_use]
pub fn resolve_token(config: &SessyncConfig) -> Option<String> {
    non_empty_env("SESSYNC_TOKEN").or_else(|| config.token.clone().filter(|t| !t.is_empty()))
}

/// Resolve the API base URL. Priority: `SESSYNC_API_URL` > config > default.
#[must_use]
pub fn resolve_api_url(config: &SessyncConfig) -> String {
    non_empty_env("SESSYNC_API_URL")
        .or_else(|| config.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

// ── Config file ──────────────────────────────────────────────

/// Load `config.json`, or defaults if it does not exist.
pub fn load_config(path: &Path) -> Result<SessyncConfig> {
    if !path.exists() {
        return Ok(SessyncConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save `config.json` atomically with owner-only permissions.
pub fn save_config(path: &Path, config: &SessyncConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    write_atomic(path, content.as_bytes())
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

/// Write to `<path>.tmp` then rename over `path`.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    {
        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(0o600);
        let mut file = opts.open(&temp_path)?;
        file.write_all(content)?;
        file.flush()?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_paths_win() {
        let explicit = PathBuf::from("/custom/home");
        assert_eq!(resolve_home(Some(&explicit)).unwrap(), explicit);
        let claude = PathBuf::from("/logs/claude");
        assert_eq!(resolve_claude_dir(Some(&claude)).unwrap(), claude);
        let cursor = PathBuf::from("/data/Cursor/User");
        assert_eq!(resolve_cursor_dir(Some(&cursor)).unwrap(), cursor);
    }

    #[test]
    fn test_home_layout() {
        let home = PathBuf::from("/h");
        assert_eq!(config_path(&home), PathBuf::from("/h/config.json"));
        assert_eq!(lock_path(&home), PathBuf::from("/h/hooks.lock"));
        assert_eq!(hook_log_path(&home), PathBuf::from("/h/logs/hooks.log"));
    }

    #[test]
    fn test_missing_config_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.json")).unwrap();
        assert!(config.token.is_none());
        assert!(config.sync_boundaries.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let config = SessyncConfig {
            token: Some("tok".into()),
            api_url: Some("http://localhost:8080/".into()),
            ..SessyncConfig::default()
        };
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.token.as_deref(), Some("tok"));
        assert!(!tmp.path().join("nested").join("config.json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_corrupt_config_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_config(&path).unwrap_err();
        assert_eq!(err.exit_code(), 7);
    }
}
