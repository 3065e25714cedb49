//! Persisted sync state.
//!
//! The orchestrator reads a project's [`SyncBoundary`] once at the start of
//! a run and writes it once after a successful upload. Storage is behind
//! [`SyncStateStore`] so runs can be tested without touching the real
//! config file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{load_config, save_config};
use crate::error::Result;

/// High-water marks of what has been uploaded for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBoundary {
    pub oldest_synced_timestamp: DateTime<Utc>,
    pub newest_synced_timestamp: DateTime<Utc>,
    pub project_display_name: String,
    pub session_count: usize,
    pub last_updated: DateTime<Utc>,
}

impl SyncBoundary {
    /// Merge an upload of `count` sessions spanning `oldest..=newest`.
    ///
    /// The range only ever widens: the earlier oldest and the later newest
    /// of the existing boundary and the new upload are kept.
    #[must_use]
    pub fn merged(
        existing: Option<&Self>,
        oldest: DateTime<Utc>,
        newest: DateTime<Utc>,
        count: usize,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Self {
        match existing {
            Some(prev) => Self {
                oldest_synced_timestamp: prev.oldest_synced_timestamp.min(oldest),
                newest_synced_timestamp: prev.newest_synced_timestamp.max(newest),
                project_display_name: display_name.to_string(),
                session_count: prev.session_count + count,
                last_updated: now,
            },
            None => Self {
                oldest_synced_timestamp: oldest,
                newest_synced_timestamp: newest,
                project_display_name: display_name.to_string(),
                session_count: count,
                last_updated: now,
            },
        }
    }
}

/// Generic marker for runs not tied to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSync {
    pub label: String,
    pub at: DateTime<Utc>,
    pub sessions: usize,
}

/// Read/write access to persisted sync progress.
pub trait SyncStateStore {
    /// Boundary for a project, if one was ever written.
    fn sync_boundary(&self, project_key: &str) -> Result<Option<SyncBoundary>>;

    /// Replace a project's boundary.
    fn save_sync_boundary(&self, project_key: &str, boundary: &SyncBoundary) -> Result<()>;

    /// Record a run that has no project key.
    fn record_last_sync(&self, last: &LastSync) -> Result<()>;
}

/// Normalise a project path for use as a boundary key.
#[must_use]
pub fn project_key(project_path: &str) -> String {
    let trimmed = project_path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        project_path.to_string()
    } else {
        trimmed.to_string()
    }
}

/// [`SyncStateStore`] backed by `config.json`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SyncStateStore for ConfigStore {
    fn sync_boundary(&self, project_key_raw: &str) -> Result<Option<SyncBoundary>> {
        let config = load_config(&self.path)?;
        Ok(config.sync_boundaries.get(&project_key(project_key_raw)).cloned())
    }

    fn save_sync_boundary(&self, project_key_raw: &str, boundary: &SyncBoundary) -> Result<()> {
        let mut config = load_config(&self.path)?;
        let key = project_key(project_key_raw);
        debug!(
            project = %key,
            newest = %boundary.newest_synced_timestamp,
            sessions = boundary.session_count,
            "Saving sync boundary"
        );
        config.sync_boundaries.insert(key, boundary.clone());
        save_config(&self.path, &config)
    }

    fn record_last_sync(&self, last: &LastSync) -> Result<()> {
        let mut config = load_config(&self.path)?;
        config.last_sync = Some(last.clone());
        save_config(&self.path, &config)
    }
}
