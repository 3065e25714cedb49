//! Sync orchestrator.
//!
//! One run moves through
//! `Authenticating → Loading → Sanitizing → {dry-run exit | Uploading} → PersistingState`.
//!
//! - **Fetch window**: all-projects runs read everything. Hook runs read
//!   sessions newer than the project's `newestSyncedTimestamp`, or the last
//!   30 days on first run. Manual single-project runs read everything for
//!   that project.
//! - **Filtering**: sessions shorter than four minutes are never uploaded.
//! - **Upload**: batches go out one at a time with a pause in between.
//!   Network and 5xx failures are retried once; anything else fails the run.
//! - **Persistence**: only after every batch succeeded.
//!
//! In silent (hook) mode every error is logged and swallowed so the host
//! application is never blocked.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::batch::{build_batches, BATCH_SIZE};
use super::lock::HookLock;
use super::transport::UploadTransport;
use super::types::{
    ApiSession, SyncOptions, SyncOutcome, SyncReport, SyncStage, UploadBatch, UploadResponse,
};
use crate::config::{LastSync, SyncBoundary, SyncStateStore};
use crate::error::{Error, Result};
use crate::model::{project_display_name, Session};
use crate::readers::{ReadOptions, SessionSource};

/// Sessions shorter than this are not uploaded.
pub const MIN_SESSION_SECS: u64 = 240;

/// Lookback for a hook run on a project with no boundary yet.
pub const FIRST_RUN_LOOKBACK_DAYS: i64 = 30;

/// Pause between consecutive batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(1);

/// Pause before the single retry of a failed batch.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Label recorded for runs with no single project.
const ALL_PROJECTS_LABEL: &str = "all projects";

/// Drives one sync from a session source to an upload transport.
pub struct Orchestrator<S, T, St> {
    source: S,
    transport: T,
    store: St,
    batch_size: usize,
    batch_delay: Duration,
    retry_delay: Duration,
}

impl<S, T, St> Orchestrator<S, T, St>
where
    S: SessionSource,
    T: UploadTransport,
    St: SyncStateStore,
{
    pub fn new(source: S, transport: T, store: St) -> Self {
        Self {
            source,
            transport,
            store,
            batch_size: BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Run one sync.
    ///
    /// # Errors
    ///
    /// Interactive runs return the first error. Silent runs never error;
    /// they log it and report `SyncOutcome::Failed`.
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncReport> {
        let mut stage = SyncStage::Authenticating;
        match self.run_stages(options, &mut stage).await {
            Ok(report) => Ok(report),
            Err(e) if options.is_silent() => {
                error!(
                    hook = options.hook.as_deref().unwrap_or_default(),
                    %stage,
                    code = e.error_code().as_str(),
                    error = %e,
                    "Hook sync failed"
                );
                Ok(SyncReport::new(SyncOutcome::Failed {
                    stage,
                    message: e.to_string(),
                }))
            }
            Err(e) => Err(e),
        }
    }

    async fn run_stages(&self, options: &SyncOptions, stage: &mut SyncStage) -> Result<SyncReport> {
        // ── Authenticating ──
        *stage = SyncStage::Authenticating;
        self.transport.ensure_authenticated().await?;

        // ── Loading ──
        *stage = SyncStage::Loading;
        let project = options.effective_project().map(str::to_string);
        let since = self.fetch_since(options, project.as_deref())?;
        info!(
            tool = %self.source.tool(),
            project = project.as_deref().unwrap_or("(all)"),
            since = ?since,
            "Loading sessions"
        );

        let read = self.source.read_sessions(&ReadOptions {
            since,
            project_path: project.clone(),
        })?;

        let mut report = SyncReport::new(SyncOutcome::NothingToSync);
        report.since = since;
        report.project.clone_from(&project);
        report.sessions_found = read.sessions.len();
        report.skipped_files = read.skipped_files;
        report.skipped_records = read.skipped_records;

        if read.sessions.is_empty() {
            info!("No new sessions");
            return Ok(report);
        }

        let (qualifying, short): (Vec<Session>, Vec<Session>) = read
            .sessions
            .into_iter()
            .partition(|s| s.duration >= MIN_SESSION_SECS);
        report.sessions_filtered = short.len();
        debug!(
            qualifying = qualifying.len(),
            filtered = short.len(),
            "Applied minimum duration"
        );

        if qualifying.is_empty() {
            if options.initial_sync {
                info!(filtered = short.len(), "No qualifying sessions for initial sync");
                return Ok(report);
            }
            return Err(Error::NoQualifyingSessions {
                filtered: short.len(),
                min_secs: MIN_SESSION_SECS,
            });
        }

        // ── Sanitizing ──
        *stage = SyncStage::Sanitizing;
        let api_sessions: Vec<ApiSession> = qualifying.iter().map(ApiSession::from_session).collect();
        report.sessions_uploaded = api_sessions.len();

        if options.dry_run {
            report.batches = super::batch::batch_count(api_sessions.len(), self.batch_size);
            report.outcome = SyncOutcome::DryRun;
            report.preview = api_sessions;
            info!(sessions = report.sessions_uploaded, "Dry run, nothing uploaded");
            return Ok(report);
        }

        let batches = build_batches(api_sessions, self.batch_size)?;
        report.batches = batches.len();

        // ── Uploading ──
        *stage = SyncStage::Uploading;
        for (i, batch) in batches.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            let response = self.upload_with_retry(batch).await?;
            if !response.success {
                warn!(batch = batch.batch_number, "Upload service did not confirm success");
            }
            report.created += response.created;
            report.duplicates += response.duplicates;
            if response.streak.is_some() {
                report.streak = response.streak;
            }
            if response.analysis_preview.is_some() {
                report.analysis_preview = response.analysis_preview;
            }
        }
        info!(
            batches = report.batches,
            created = report.created,
            duplicates = report.duplicates,
            "Upload complete"
        );

        // ── PersistingState ──
        *stage = SyncStage::PersistingState;
        self.persist(project.as_deref(), &qualifying)?;

        report.outcome = SyncOutcome::Uploaded;
        Ok(report)
    }

    /// Lower bound of the fetch window, if any.
    fn fetch_since(&self, options: &SyncOptions, project: Option<&str>) -> Result<Option<DateTime<Utc>>> {
        if options.all_projects || options.hook.is_none() {
            return Ok(None);
        }
        let boundary = match project {
            Some(project) => self.store.sync_boundary(project)?,
            None => None,
        };
        Ok(Some(match boundary {
            Some(b) => b.newest_synced_timestamp,
            None => Utc::now() - ChronoDuration::days(FIRST_RUN_LOOKBACK_DAYS),
        }))
    }

    async fn upload_with_retry(&self, batch: &UploadBatch) -> Result<UploadResponse> {
        match self.transport.upload_batch(batch).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_transient() => {
                warn!(
                    batch = batch.batch_number,
                    error = %e,
                    "Batch upload failed, retrying once"
                );
                if !self.retry_delay.is_zero() {
                    tokio::time::sleep(self.retry_delay).await;
                }
                self.transport.upload_batch(batch).await
            }
            Err(e) => Err(e),
        }
    }

    fn persist(&self, project: Option<&str>, uploaded: &[Session]) -> Result<()> {
        let now = Utc::now();

        let Some(project) = project else {
            return self.store.record_last_sync(&LastSync {
                label: ALL_PROJECTS_LABEL.to_string(),
                at: now,
                sessions: uploaded.len(),
            });
        };

        let (Some(oldest), Some(newest)) = (
            uploaded.iter().map(|s| s.timestamp).min(),
            uploaded.iter().map(|s| s.timestamp).max(),
        ) else {
            return Ok(());
        };
        let display_name = uploaded
            .first()
            .map_or_else(|| project_display_name(project), |s| s.project_name.clone());

        let existing = self.store.sync_boundary(project)?;
        let boundary = SyncBoundary::merged(
            existing.as_ref(),
            oldest,
            newest,
            uploaded.len(),
            &display_name,
            now,
        );
        self.store.save_sync_boundary(project, &boundary)
    }
}

/// Run a hook-triggered sync behind the concurrency guard.
///
/// Returns `SyncOutcome::LockBusy` without doing anything if another hook
/// run holds the lock. The lock is always released afterwards.
///
/// # Errors
///
/// None in practice: the run is forced into silent mode.
pub async fn run_hook_sync<S, T, St>(
    orchestrator: &Orchestrator<S, T, St>,
    lock: &HookLock,
    options: &SyncOptions,
) -> Result<SyncReport>
where
    S: SessionSource,
    T: UploadTransport,
    St: SyncStateStore,
{
    if !lock.acquire() {
        info!(lock = %lock.path().display(), "Another sync is running, skipping");
        return Ok(SyncReport::new(SyncOutcome::LockBusy));
    }

    let mut options = options.clone();
    if options.hook.is_none() {
        options.hook = Some("unspecified".to_string());
    }

    let result = orchestrator.run(&options).await;
    lock.release();
    result
}
