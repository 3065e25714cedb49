//! Canonical session model.
//!
//! Every reader produces `Session` values. A session is built once from a
//! `SessionDraft` and is never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use super::message::{Message, Role};

/// Coding assistant that recorded a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    ClaudeCode,
    Cursor,
    #[serde(rename = "vscode")]
    VsCode,
}

impl Tool {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude_code",
            Self::Cursor => "cursor",
            Self::VsCode => "vscode",
        }
    }

    /// Human-readable product name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "Claude Code",
            Self::Cursor => "Cursor",
            Self::VsCode => "VS Code",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which models an assistant used during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    pub models: BTreeSet<String>,
    pub primary_model: String,
    pub per_model_count: BTreeMap<String, u32>,
    pub switch_count: u32,
}

/// Accumulates model declarations of consecutive assistant messages.
#[derive(Debug, Default)]
pub struct ModelTracker {
    counts: BTreeMap<String, u32>,
    last: Option<String>,
    switches: u32,
}

impl ModelTracker {
    /// Record the model declared by the next assistant message.
    pub fn record(&mut self, model: &str) {
        if model.is_empty() || model == "<synthetic>" {
            return;
        }
        *self.counts.entry(model.to_string()).or_insert(0) += 1;
        if let Some(last) = &self.last {
            if last != model {
                self.switches += 1;
            }
        }
        self.last = Some(model.to_string());
    }

    /// `None` if no assistant message declared a model.
    #[must_use]
    pub fn finish(self) -> Option<ModelUsage> {
        // Ties resolve to the alphabetically first model.
        let primary = self
            .counts
            .iter()
            .fold(None::<(&String, u32)>, |best, (name, &count)| match best {
                Some((_, c)) if c >= count => best,
                _ => Some((name, count)),
            })
            .map(|(name, _)| name.clone())?;

        Some(ModelUsage {
            models: self.counts.keys().cloned().collect(),
            primary_model: primary,
            per_model_count: self.counts,
            switch_count: self.switches,
        })
    }
}

/// Where a session was read from, so it can be located again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// A line-delimited log file.
    LogFile { path: PathBuf },
    /// A conversation record inside an embedded database.
    Database { path: PathBuf, key: String },
}

/// One recorded interaction between a user and a coding assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub project_path: String,
    pub project_name: String,
    /// Session start.
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Message>,
    /// Seconds between first and last message, never negative.
    pub duration: u64,
    pub tool: Tool,
    pub file_edit_count: usize,
    pub languages: BTreeSet<String>,
    pub model_usage: Option<ModelUsage>,
    pub plan_mode_exits: u32,
    pub provenance: Provenance,
}

impl Session {
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }
}

/// Everything a reader gathers before a `Session` can be finalised.
#[derive(Debug)]
pub struct SessionDraft {
    pub id: String,
    pub project_path: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub tool: Tool,
    pub edited_files: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub model_usage: Option<ModelUsage>,
    pub plan_mode_exits: u32,
    pub provenance: Provenance,
    /// Overrides the name derived from `project_path`.
    pub project_name: Option<String>,
}

impl SessionDraft {
    /// Finalise the draft. Returns `None` when there are no messages.
    #[must_use]
    pub fn finish(self) -> Option<Session> {
        if self.messages.is_empty() {
            return None;
        }

        let duration = session_duration(&self.messages);
        let project_name = self
            .project_name
            .unwrap_or_else(|| project_display_name(&self.project_path));

        Some(Session {
            id: self.id,
            project_path: self.project_path,
            project_name,
            timestamp: self.timestamp,
            messages: self.messages,
            duration,
            tool: self.tool,
            file_edit_count: self.edited_files.len(),
            languages: self.languages,
            model_usage: self.model_usage,
            plan_mode_exits: self.plan_mode_exits,
            provenance: self.provenance,
        })
    }
}

/// `max(0, last.timestamp - first.timestamp)` in whole seconds.
#[must_use]
pub fn session_duration(messages: &[Message]) -> u64 {
    match (messages.first(), messages.last()) {
        (Some(first), Some(last)) => {
            let secs = last.timestamp.signed_duration_since(first.timestamp).num_seconds();
            u64::try_from(secs).unwrap_or(0)
        }
        _ => 0,
    }
}

/// Last path component, used as the project's display name.
#[must_use]
pub fn project_display_name(project_path: &str) -> String {
    let trimmed = project_path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        return "Unknown project".to_string();
    }
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}
