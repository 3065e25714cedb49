//! Concurrency guard for hook-triggered runs.
//!
//! Hook runs are separate OS processes, so overlap is prevented with a lock
//! file holding `{pid, timestamp, host}`. A lock older than the stale
//! timeout is treated as absent and replaced. There is no heartbeat; a
//! run that outlives the timeout can be overlapped.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Age after which a lock is considered abandoned.
pub const STALE_AFTER: Duration = Duration::from_secs(60);

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub host: String,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            host: host_identifier(),
        }
    }

    fn is_stale(&self, now_ms: i64, stale_after: Duration) -> bool {
        let age_ms = now_ms.saturating_sub(self.timestamp);
        let limit = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
        age_ms > limit
    }
}

fn host_identifier() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Single-owner advisory file lock. Never errors; failures read as "busy".
#[derive(Debug, Clone)]
pub struct HookLock {
    path: PathBuf,
    stale_after: Duration,
}

impl HookLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_after: STALE_AFTER,
        }
    }

    #[must_use]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lock contents, if readable.
    #[must_use]
    pub fn holder(&self) -> Option<LockInfo> {
        let raw = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Take the lock. Returns `false` if a live lock is held.
    ///
    /// A stale lock is reclaimed. A lock file that cannot be parsed is
    /// treated as held until its mtime is older than the stale timeout,
    /// since a competing process may still be writing it.
    #[must_use]
    pub fn acquire(&self) -> bool {
        if self.path.exists() && !self.reclaim_stale() {
            return false;
        }

        match self.write_new() {
            Ok(()) => true,
            // Another process created the lock first.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not write hook lock");
                false
            }
        }
    }

    /// Move a stale lock out of the way. Returns `false` if the lock is live
    /// or was replaced by another process in the meantime.
    fn reclaim_stale(&self) -> bool {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let observed = self.holder();
        match &observed {
            Some(info) if !info.is_stale(now_ms, self.stale_after) => {
                debug!(pid = info.pid, host = %info.host, "Hook lock is held");
                return false;
            }
            Some(info) => debug!(pid = info.pid, host = %info.host, "Reclaiming stale hook lock"),
            None if !self.file_older_than_stale() => {
                debug!(path = %self.path.display(), "Hook lock is being written");
                return false;
            }
            None => debug!(path = %self.path.display(), "Reclaiming unreadable hook lock"),
        }

        // Rename is atomic: whichever file we moved is the one we inspect.
        let tomb = self.sibling(&format!("stale.{}", std::process::id()));
        match fs::rename(&self.path, &tomb) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not move stale lock");
                return false;
            }
        }

        let moved = fs::read_to_string(&tomb)
            .ok()
            .and_then(|raw| serde_json::from_str::<LockInfo>(&raw).ok());
        if moved != observed {
            // Another process took the lock between our read and the rename.
            if fs::hard_link(&tomb, &self.path).is_err() {
                debug!(path = %self.path.display(), "Lock changed hands while reclaiming");
            }
            let _ = fs::remove_file(&tomb);
            return false;
        }
        let _ = fs::remove_file(&tomb);
        true
    }

    fn file_older_than_stale(&self) -> bool {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > self.stale_after)
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Write the holder to a private file, then link it into place so the
    /// lock never exists without its contents.
    fn write_new(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(&LockInfo::current())?;
        let staging = self.sibling(&format!("new.{}", std::process::id()));
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)?;
        file.write_all(&json)?;
        file.flush()?;
        drop(file);

        let linked = fs::hard_link(&staging, &self.path);
        let _ = fs::remove_file(&staging);
        linked
    }

    /// Delete the lock file. A missing file is fine.
    pub fn release(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released hook lock"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Could not release hook lock"),
        }
    }
}
