//! Sync types.
//!
//! Wire shapes sent to the upload service, the run options an external
//! trigger passes in, and the report a run hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::model::{ModelUsage, Session, Tool};
use crate::sanitize::{sanitize_messages, SanitizedMessage};

// ── Wire shapes ──────────────────────────────────────────────

/// A sanitized session in the upload service's shape.
///
/// Carries the project's display name only, never its full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSession {
    pub tool: Tool,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration: u64,
    pub project_name: String,
    pub data: ApiSessionData,
    pub metadata: ApiSessionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSessionData {
    pub messages: Vec<SanitizedMessage>,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSessionMetadata {
    pub files_edited: usize,
    pub languages: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelUsage>,
    pub plan_mode_exits: u32,
}

impl ApiSession {
    /// Sanitize a session into its upload shape.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let messages = sanitize_messages(&session.messages);
        Self {
            tool: session.tool,
            session_id: session.id.clone(),
            timestamp: session.timestamp,
            duration: session.duration,
            project_name: session.project_name.clone(),
            data: ApiSessionData {
                message_count: messages.len(),
                messages,
            },
            metadata: ApiSessionMetadata {
                files_edited: session.file_edit_count,
                languages: session.languages.clone(),
                model_info: session.model_usage.clone(),
                plan_mode_exits: session.plan_mode_exits,
            },
        }
    }
}

/// One upload request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBatch {
    pub sessions: Vec<ApiSession>,
    /// SHA-256 of the serialized sessions.
    pub checksum: String,
    /// 1-based.
    pub batch_number: usize,
    pub total_batches: usize,
    pub total_sessions: usize,
}

/// Server streak summary, passed through for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakInfo {
    #[serde(default)]
    pub current: u32,
    #[serde(default)]
    pub longest: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u64>,
}

/// Server reply to one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub duplicates: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_preview: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<StreakInfo>,
}

// ── Run options ──────────────────────────────────────────────

/// What an external trigger asks a run to do.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Every project, no time filter. Wins over `project_dir`.
    pub all_projects: bool,
    /// Restrict to one project.
    pub project_dir: Option<String>,
    /// Hook event that triggered the run. Hook runs are silent.
    pub hook: Option<String>,
    /// Stop after sanitizing.
    pub dry_run: bool,
    /// First sync during onboarding; an empty result is not an error.
    pub initial_sync: bool,
}

impl SyncOptions {
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.hook.is_some()
    }

    /// Project filter after applying the all-projects override.
    #[must_use]
    pub fn effective_project(&self) -> Option<&str> {
        if self.all_projects {
            None
        } else {
            self.project_dir.as_deref()
        }
    }
}

// ── Report ───────────────────────────────────────────────────

/// Orchestrator states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Authenticating,
    Loading,
    Sanitizing,
    Uploading,
    PersistingState,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Authenticating => "authenticating",
            Self::Loading => "loading",
            Self::Sanitizing => "sanitizing",
            Self::Uploading => "uploading",
            Self::PersistingState => "persisting_state",
        };
        f.write_str(s)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Uploaded,
    DryRun,
    NothingToSync,
    /// Another hook run holds the lock.
    LockBusy,
    /// Silent mode only; interactive runs return the error instead.
    Failed { stage: SyncStage, message: String },
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub since: Option<DateTime<Utc>>,
    pub project: Option<String>,
    /// Sessions returned by the reader.
    pub sessions_found: usize,
    /// Sessions dropped for being too short.
    pub sessions_filtered: usize,
    /// Sessions sent (or that would be sent, in a dry run).
    pub sessions_uploaded: usize,
    pub batches: usize,
    pub created: usize,
    pub duplicates: usize,
    pub skipped_files: usize,
    pub skipped_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<StreakInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_preview: Option<Value>,
    /// Populated for dry runs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<ApiSession>,
}

impl SyncReport {
    #[must_use]
    pub fn new(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            since: None,
            project: None,
            sessions_found: 0,
            sessions_filtered: 0,
            sessions_uploaded: 0,
            batches: 0,
            created: 0,
            duplicates: 0,
            skipped_files: 0,
            skipped_records: 0,
            streak: None,
            analysis_preview: None,
            preview: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Failed { .. })
    }
}
