//! Claude Code line-log reader.
//!
//! Claude Code stores session transcripts at:
//!   `~/.claude/projects/<encoded-path>/<session-id>.jsonl`
//!
//! where `<encoded-path>` is the project path with separators replaced by
//! `-`. Each line is a JSON record; user and assistant records carry a
//! `message`, and tool results for file edits carry a `toolUseResult`
//! with the edited `filePath`.
//!
//! Files are filtered cheaply before parsing: first by modification time,
//! then by the timestamp found in the first few lines.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use super::{language_for_path, ReadOptions, ReadOutcome, SessionSource};
use crate::error::{Error, Result};
use crate::model::{
    AttachmentKind, ContentPart, Message, MessageContent, ModelTracker, Provenance, Role,
    SessionDraft, Tool,
};

/// Bytes read when peeking at a file header.
const PEEK_BYTES: u64 = 2048;
/// Lines inspected when peeking at a file header.
const PEEK_LINES: usize = 10;

/// Tool name whose invocations mark the end of a planning phase.
const EXIT_PLAN_MODE_TOOL: &str = "ExitPlanMode";

/// Reader for Claude Code's per-project JSONL session logs.
#[derive(Debug, Clone)]
pub struct ClaudeReader {
    root: PathBuf,
}

impl ClaudeReader {
    /// Create a reader rooted at the `projects` directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SessionSource for ClaudeReader {
    fn tool(&self) -> Tool {
        Tool::ClaudeCode
    }

    fn read_sessions(&self, options: &ReadOptions) -> Result<ReadOutcome> {
        if !self.root.is_dir() {
            return Err(Error::SourceNotFound {
                source_name: Tool::ClaudeCode.display_name().to_string(),
                path: self.root.clone(),
            });
        }

        let wanted_dir = options.project_path.as_deref().map(encode_project_dir);
        let mut outcome = ReadOutcome::default();

        for project_dir in list_project_dirs(&self.root)? {
            let dir_name = project_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            if let Some(wanted) = &wanted_dir {
                if encode_project_dir(&dir_name) != *wanted {
                    continue;
                }
            }

            for file in list_session_files(&project_dir) {
                read_one_file(&file, options, &mut outcome);
            }
        }

        outcome.sort();
        debug!(
            root = %self.root.display(),
            sessions = outcome.sessions.len(),
            skipped_files = outcome.skipped_files,
            skipped_records = outcome.skipped_records,
            "Read Claude Code sessions"
        );
        Ok(outcome)
    }
}

/// Encode a project path the way Claude Code names its project directories.
///
/// Every character other than ASCII alphanumerics and `-` becomes `-`:
///   `/Users/dev/my.app` → `-Users-dev-my-app`
///
/// Already-encoded names map to themselves.
#[must_use]
pub fn encode_project_dir(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

fn list_project_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn list_session_files(project_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(project_dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    files
}

/// Apply the cheap checks, then fully parse one file into `outcome`.
fn read_one_file(path: &Path, options: &ReadOptions, outcome: &mut ReadOutcome) {
    if let Some(since) = options.since {
        if modified_before(path, since) {
            trace!(file = %path.display(), "Skipping file older than since (mtime)");
            return;
        }
        if let Some(early) = peek_timestamp(path) {
            if early <= since {
                trace!(file = %path.display(), %early, "Skipping file older than since (header)");
                return;
            }
        }
    }

    match parse_session_file(path) {
        Ok(parsed) => {
            outcome.skipped_records += parsed.malformed_lines;
            let Some(session) = parsed.draft.and_then(SessionDraft::finish) else {
                debug!(file = %path.display(), "Dropping session without metadata or messages");
                return;
            };
            if !options.is_after_since(session.timestamp) {
                return;
            }
            outcome.sessions.push(session);
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Failed to parse session file, skipping");
            outcome.skipped_files += 1;
        }
    }
}

fn modified_before(path: &Path, since: DateTime<Utc>) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|modified| DateTime::<Utc>::from(modified) < since)
        .unwrap_or(false)
}

/// Find the first declared timestamp in the head of a file.
fn peek_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file.take(PEEK_BYTES));

    // A line cut off by the byte limit fails to parse and is ignored.
    reader
        .split(b'\n')
        .take(PEEK_LINES)
        .map_while(std::result::Result::ok)
        .filter_map(|line| serde_json::from_slice::<Value>(&line).ok())
        .find_map(|value| value.get("timestamp")?.as_str().and_then(parse_timestamp))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One line of a Claude Code session log. All fields are optional because
/// record shapes vary between record types and releases.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    session_id: Option<String>,
    cwd: Option<String>,
    timestamp: Option<String>,
    message: Option<LogMessage>,
    tool_use_result: Option<Value>,
    #[serde(default)]
    is_meta: bool,
}

#[derive(Debug, Deserialize)]
struct LogMessage {
    role: Option<String>,
    content: Option<Value>,
    timestamp: Option<String>,
    model: Option<String>,
}

/// Result of a full parse of one file.
struct ParsedFile {
    draft: Option<SessionDraft>,
    malformed_lines: usize,
}

/// Accumulates everything a single pass over the records yields.
#[derive(Default)]
struct Accumulator {
    session_id: Option<String>,
    cwd: Option<String>,
    started_at: Option<DateTime<Utc>>,
    messages: Vec<Message>,
    edited_files: BTreeSet<String>,
    languages: BTreeSet<String>,
    models: ModelTracker,
    plan_mode_exits: u32,
}

impl Accumulator {
    fn absorb(&mut self, record: LogRecord) {
        if self.session_id.is_none() {
            self.session_id = record.session_id.filter(|s| !s.is_empty());
        }
        if self.cwd.is_none() {
            self.cwd = record.cwd.filter(|s| !s.is_empty());
        }
        let record_ts = record.timestamp.as_deref().and_then(parse_timestamp);
        if self.started_at.is_none() {
            self.started_at = record_ts;
        }

        if let Some(result) = &record.tool_use_result {
            if let Some(path) = edited_file_path(result) {
                if let Some(language) = language_for_path(path) {
                    self.languages.insert(language.to_string());
                }
                self.edited_files.insert(path.to_string());
            }
        }

        let Some(message) = record.message else {
            return;
        };
        if record.is_meta {
            return;
        }
        let Some(role) = message.role.as_deref().and_then(Role::parse) else {
            return;
        };
        let Some(timestamp) = message
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .or(record_ts)
        else {
            return;
        };

        let (content, plan_exits) = extract_content(message.content.as_ref());
        self.plan_mode_exits += plan_exits;

        if role == Role::Assistant {
            if let Some(model) = &message.model {
                self.models.record(model);
            }
        }

        if !content.is_empty() {
            self.messages.push(Message::new(role, content, timestamp));
        }
    }

    fn into_draft(self, path: &Path) -> Option<SessionDraft> {
        let (Some(id), Some(cwd), Some(started_at)) = (self.session_id, self.cwd, self.started_at)
        else {
            return None;
        };

        Some(SessionDraft {
            id,
            project_path: cwd,
            timestamp: started_at,
            messages: self.messages,
            tool: Tool::ClaudeCode,
            edited_files: self.edited_files,
            languages: self.languages,
            model_usage: self.models.finish(),
            plan_mode_exits: self.plan_mode_exits,
            provenance: Provenance::LogFile { path: path.to_path_buf() },
            project_name: None,
        })
    }
}

fn parse_session_file(path: &Path) -> Result<ParsedFile> {
    let reader = BufReader::new(File::open(path)?);

    let mut acc = Accumulator::default();
    let mut malformed_lines = 0;

    // Split on raw bytes so one line with invalid UTF-8 costs only that line.
    for line in reader.split(b'\n') {
        let line = line?;
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<LogRecord>(line) {
            Ok(record) => acc.absorb(record),
            Err(_) => malformed_lines += 1,
        }
    }

    Ok(ParsedFile {
        draft: acc.into_draft(path),
        malformed_lines,
    })
}

/// Path of the file touched by an edit/write tool result, if it is one.
fn edited_file_path(result: &Value) -> Option<&str> {
    let path = result.get("filePath")?.as_str()?;
    let is_edit = result.get("structuredPatch").is_some()
        || result.get("oldString").is_some()
        || result.get("edits").is_some()
        || matches!(
            result.get("type").and_then(Value::as_str),
            Some("create" | "update")
        );
    is_edit.then_some(path)
}

/// Convert raw message content to [`MessageContent`].
///
/// Image blocks become attachment markers (their payload is dropped), tool
/// calls and tool results are not part of the conversation text. Returns the
/// content and the number of `ExitPlanMode` invocations seen.
fn extract_content(content: Option<&Value>) -> (MessageContent, u32) {
    match content {
        Some(Value::String(text)) => (MessageContent::Text(text.clone()), 0),
        Some(Value::Array(blocks)) => {
            let mut parts = Vec::new();
            let mut plan_exits = 0;
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            parts.push(ContentPart::Text { text: text.to_string() });
                        }
                    }
                    Some("image") => parts.push(ContentPart::Attachment {
                        kind: AttachmentKind::Image,
                    }),
                    Some("document") => parts.push(ContentPart::Attachment {
                        kind: AttachmentKind::Document,
                    }),
                    Some("tool_use") => {
                        if block.get("name").and_then(Value::as_str) == Some(EXIT_PLAN_MODE_TOOL) {
                            plan_exits += 1;
                        }
                    }
                    _ => {}
                }
            }
            (MessageContent::from_parts(parts), plan_exits)
        }
        _ => (MessageContent::Text(String::new()), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn user_line(session: &str, ts: &str, text: &str) -> String {
        serde_json::json!({
            "type": "user",
            "sessionId": session,
            "cwd": "/home/dev/shop-api",
            "timestamp": ts,
            "message": { "role": "user", "content": text }
        })
        .to_string()
    }

    fn assistant_line(ts: &str, model: &str, content: Value) -> String {
        serde_json::json!({
            "type": "assistant",
            "timestamp": ts,
            "message": { "role": "assistant", "model": model, "content": content }
        })
        .to_string()
    }

    fn write_session(root: &Path, project: &str, name: &str, lines: &[String]) -> PathBuf {
        let dir = root.join(project);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let reader = ClaudeReader::new("/nonexistent/claude/projects");
        let err = reader.read_sessions(&ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[test]
    fn test_reads_basic_session() {
        let tmp = TempDir::new().unwrap();
        write_session(
            tmp.path(),
            "-home-dev-shop-api",
            "a.jsonl",
            &[
                user_line("sess-a", "2025-03-01T10:00:00Z", "add a cart endpoint"),
                assistant_line(
                    "2025-03-01T10:10:00Z",
                    "claude-sonnet-4",
                    serde_json::json!([{ "type": "text", "text": "done" }]),
                ),
            ],
        );

        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap();
        assert_eq!(outcome.sessions.len(), 1);
        let session = &outcome.sessions[0];
        assert_eq!(session.id, "sess-a");
        assert_eq!(session.project_path, "/home/dev/shop-api");
        assert_eq!(session.project_name, "shop-api");
        assert_eq!(session.duration, 600);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.tool, Tool::ClaudeCode);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write_session(
            tmp.path(),
            "-p",
            "a.jsonl",
            &[
                user_line("s", "2025-03-01T10:00:00Z", "one"),
                "{not json".to_string(),
                user_line("s", "2025-03-01T10:05:00Z", "two"),
            ],
        );

        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap();
        assert_eq!(outcome.sessions[0].messages.len(), 2);
        assert_eq!(outcome.skipped_records, 1);
    }

    #[test]
    fn test_unreadable_file_does_not_abort_siblings() {
        let tmp = TempDir::new().unwrap();
        write_session(
            tmp.path(),
            "-p",
            "good.jsonl",
            &[user_line("good", "2025-03-01T10:00:00Z", "hello")],
        );
        // Opens but cannot be read as a file.
        fs::create_dir_all(tmp.path().join("-p").join("bad.jsonl")).unwrap();

        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap();
        assert_eq!(outcome.sessions.len(), 1);
        assert_eq!(outcome.skipped_files, 1);
    }

    #[test]
    fn test_invalid_utf8_line_costs_only_that_line() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("-p");
        fs::create_dir_all(&dir).unwrap();

        let mut bytes = user_line("s", "2025-03-01T10:00:00Z", "one").into_bytes();
        bytes.extend_from_slice(b"\n{\"type\":\"user\",\"x\":\"\xff\xfe\"}\n");
        bytes.extend_from_slice(user_line("s", "2025-03-01T10:05:00Z", "two").as_bytes());
        fs::write(dir.join("a.jsonl"), bytes).unwrap();

        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap();
        assert_eq!(outcome.sessions.len(), 1);
        assert_eq!(outcome.sessions[0].messages.len(), 2);
        assert_eq!(outcome.skipped_files, 0);
        assert_eq!(outcome.skipped_records, 1);
    }

    #[test]
    fn test_session_without_metadata_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let line = serde_json::json!({
            "type": "user",
            "timestamp": "2025-03-01T10:00:00Z",
            "message": { "role": "user", "content": "no session id" }
        })
        .to_string();
        write_session(tmp.path(), "-p", "a.jsonl", &[line]);

        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap();
        assert!(outcome.sessions.is_empty());
        assert_eq!(outcome.skipped_files, 0);
    }

    #[test]
    fn test_images_become_placeholders() {
        let tmp = TempDir::new().unwrap();
        let line = serde_json::json!({
            "sessionId": "s", "cwd": "/p", "timestamp": "2025-03-01T10:00:00Z",
            "message": { "role": "user", "content": [
                { "type": "text", "text": "what is wrong here" },
                { "type": "image", "source": { "type": "base64", "data": "iVBORw0KGgoAAAANSUhEUg" } }
            ]}
        })
        .to_string();
        write_session(tmp.path(), "-p", "a.jsonl", &[line]);

        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap();
        let collapsed = outcome.sessions[0].messages[0].content.collapse();
        assert_eq!(collapsed, "what is wrong here [1 image attachment(s)]");
        assert!(!collapsed.contains("iVBOR"));
    }

    #[test]
    fn test_edits_models_and_plan_exits() {
        let tmp = TempDir::new().unwrap();
        let edit = |ts: &str, path: &str| {
            serde_json::json!({
                "type": "user", "timestamp": ts,
                "message": { "role": "user", "content": [{ "type": "tool_result", "content": "ok" }] },
                "toolUseResult": { "filePath": path, "oldString": "a", "newString": "b", "structuredPatch": [] }
            })
            .to_string()
        };
        let read_result = serde_json::json!({
            "type": "user", "timestamp": "2025-03-01T10:02:30Z",
            "toolUseResult": { "type": "text", "file": { "filePath": "/p/README.md" } }
        })
        .to_string();

        write_session(
            tmp.path(),
            "-p",
            "a.jsonl",
            &[
                user_line("s", "2025-03-01T10:00:00Z", "plan then build"),
                assistant_line(
                    "2025-03-01T10:01:00Z",
                    "claude-opus-4",
                    serde_json::json!([{ "type": "tool_use", "name": "ExitPlanMode", "input": {} }]),
                ),
                assistant_line(
                    "2025-03-01T10:02:00Z",
                    "claude-sonnet-4",
                    serde_json::json!([{ "type": "text", "text": "editing" }]),
                ),
                edit("2025-03-01T10:03:00Z", "/p/src/lib.rs"),
                edit("2025-03-01T10:04:00Z", "/p/src/lib.rs"),
                edit("2025-03-01T10:05:00Z", "/p/web/app.ts"),
                read_result,
            ],
        );

        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap();
        let session = &outcome.sessions[0];
        assert_eq!(session.file_edit_count, 2);
        assert!(session.languages.contains("Rust"));
        assert!(session.languages.contains("TypeScript"));
        assert!(!session.languages.contains("Markdown"));
        assert_eq!(session.plan_mode_exits, 1);
        let usage = session.model_usage.as_ref().unwrap();
        assert_eq!(usage.switch_count, 1);
        assert_eq!(usage.models.len(), 2);
        // Tool-only messages carry no text and are not part of the conversation.
        assert_eq!(session.messages.len(), 2);
    }

    #[test]
    fn test_since_filter_uses_header_timestamp() {
        let tmp = TempDir::new().unwrap();
        write_session(
            tmp.path(),
            "-p",
            "old.jsonl",
            &[
                user_line("old", "2025-01-01T10:00:00Z", "old"),
                user_line("old", "2025-01-01T10:30:00Z", "still old"),
            ],
        );
        write_session(
            tmp.path(),
            "-p",
            "new.jsonl",
            &[user_line("new", "2025-03-05T10:00:00Z", "new")],
        );

        let since = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions { since: Some(since), project_path: None })
            .unwrap();
        let ids: Vec<_> = outcome.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[test]
    fn test_since_filter_uses_mtime() {
        let tmp = TempDir::new().unwrap();
        let recent = (Utc::now() - chrono::Duration::days(1)).to_rfc3339();
        let path = write_session(tmp.path(), "-p", "a.jsonl", &[user_line("s", &recent, "hello")]);
        let old = SystemTime::now() - Duration::from_secs(90 * 24 * 3600);
        filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(old)).unwrap();

        let since = Utc::now() - chrono::Duration::days(30);
        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions { since: Some(since), project_path: None })
            .unwrap();
        assert!(outcome.sessions.is_empty());
    }

    #[test]
    fn test_project_filter_and_sorting() {
        let tmp = TempDir::new().unwrap();
        write_session(
            tmp.path(),
            "-home-dev-shop-api",
            "b.jsonl",
            &[user_line("later", "2025-03-02T10:00:00Z", "x")],
        );
        write_session(
            tmp.path(),
            "-home-dev-shop-api",
            "a.jsonl",
            &[user_line("earlier", "2025-03-01T10:00:00Z", "x")],
        );
        write_session(
            tmp.path(),
            "-home-dev-other",
            "c.jsonl",
            &[user_line("other", "2025-03-01T09:00:00Z", "x")],
        );

        let outcome = ClaudeReader::new(tmp.path())
            .read_sessions(&ReadOptions {
                since: None,
                project_path: Some("/home/dev/shop-api".into()),
            })
            .unwrap();
        let ids: Vec<_> = outcome.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["earlier", "later"]);
    }

    #[test]
    fn test_encode_project_dir() {
        assert_eq!(encode_project_dir("/Users/dev/my.app"), "-Users-dev-my-app");
        assert_eq!(encode_project_dir("-Users-dev-my-app"), "-Users-dev-my-app");
    }
}
