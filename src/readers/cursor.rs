//! Cursor conversation reader.
//!
//! Cursor keeps composer (chat) conversations in a global SQLite
//! key-value store, `globalStorage/state.vscdb`, table `cursorDiskKV`.
//! Keys of the form `composerData:<composerId>` hold a JSON document in
//! one of two shapes:
//!
//! - **Inline** (older releases): a `conversation` array carrying every
//!   bubble's text.
//! - **Headers** (versioned, `_v` present): `fullConversationHeadersOnly`
//!   lists bubble ids only; each bubble's body lives under its own key
//!   `bubbleId:<composerId>:<bubbleId>` and is fetched with a point lookup.
//!
//! Project identity comes from the per-workspace databases
//! (see [`super::load_composer_projects`]).

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use super::{load_composer_projects, ReadOptions, ReadOutcome, SessionSource, WorkspaceProject};
use crate::error::{Error, Result};
use crate::model::{
    AttachmentKind, ContentPart, Message, MessageContent, ModelTracker, Provenance, Role,
    SessionDraft, Tool,
};

const COMPOSER_KEY_PREFIX: &str = "composerData:";

/// Bubble `type` values.
const BUBBLE_USER: u8 = 1;
const BUBBLE_ASSISTANT: u8 = 2;

/// Reader for Cursor's composer conversation store.
#[derive(Debug, Clone)]
pub struct CursorReader {
    global_db: PathBuf,
    workspace_storage: PathBuf,
}

impl CursorReader {
    /// Create a reader for a Cursor `User` data directory.
    pub fn new(user_dir: impl AsRef<Path>) -> Self {
        let user_dir = user_dir.as_ref();
        Self {
            global_db: user_dir.join("globalStorage").join("state.vscdb"),
            workspace_storage: user_dir.join("workspaceStorage"),
        }
    }

    #[must_use]
    pub fn database_path(&self) -> &Path {
        &self.global_db
    }

    fn not_found(&self) -> Error {
        Error::SourceNotFound {
            source_name: Tool::Cursor.display_name().to_string(),
            path: self.global_db.clone(),
        }
    }
}

impl SessionSource for CursorReader {
    fn tool(&self) -> Tool {
        Tool::Cursor
    }

    fn read_sessions(&self, options: &ReadOptions) -> Result<ReadOutcome> {
        if !self.global_db.is_file() {
            return Err(self.not_found());
        }
        let conn = Connection::open_with_flags(&self.global_db, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| {
                warn!(db = %self.global_db.display(), error = %e, "Cannot open Cursor database");
                self.not_found()
            })?;

        let projects = load_composer_projects(&self.workspace_storage);
        let mut outcome = ReadOutcome::default();

        let rows = match load_composer_rows(&conn) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    db = %self.global_db.display(),
                    error = %e,
                    "No composer data in Cursor database"
                );
                return Ok(outcome);
            }
        };

        for row in rows {
            let Ok((key, raw)) = row else {
                outcome.skipped_files += 1;
                continue;
            };
            let Some(record) = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|value| ComposerRecord::classify(&key, &value))
            else {
                trace!(%key, "Skipping unrecognised composer record");
                outcome.skipped_files += 1;
                continue;
            };

            let project = projects.get(record.composer_id());
            if !matches_project(project, options.project_path.as_deref()) {
                continue;
            }
            // Nothing in this conversation changed after `since`.
            if let (Some(since), Some(updated)) = (options.since, record.meta().last_updated()) {
                if updated <= since {
                    continue;
                }
            }

            let mut missing = 0usize;
            let bubbles = record.bubbles(|bubble_id| {
                let found = lookup_bubble(&conn, record.composer_id(), bubble_id);
                if found.is_none() {
                    missing += 1;
                }
                found
            });
            outcome.skipped_records += missing;

            let draft = build_draft(&record, bubbles, project, &self.global_db, &key);
            let Some(session) = draft.and_then(SessionDraft::finish) else {
                continue;
            };
            if options.is_after_since(session.timestamp) {
                outcome.sessions.push(session);
            }
        }

        outcome.sort();
        debug!(
            db = %self.global_db.display(),
            sessions = outcome.sessions.len(),
            skipped_files = outcome.skipped_files,
            skipped_records = outcome.skipped_records,
            "Read Cursor sessions"
        );
        Ok(outcome)
    }
}

/// Read a key-value column that may be stored as TEXT or BLOB.
pub(super) fn value_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    match row.get_ref(idx)? {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Null => Ok(String::new()),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "value".to_string(),
            other.data_type(),
        )),
    }
}

fn load_composer_rows(conn: &Connection) -> Result<Vec<rusqlite::Result<(String, String)>>> {
    let mut stmt = conn.prepare("SELECT key, value FROM cursorDiskKV WHERE key LIKE ?1")?;
    let rows = stmt
        .query_map([format!("{COMPOSER_KEY_PREFIX}%")], |row| {
            Ok((row.get::<_, String>(0)?, value_text(row, 1)?))
        })?
        .collect();
    Ok(rows)
}

fn lookup_bubble(conn: &Connection, composer_id: &str, bubble_id: &str) -> Option<Bubble> {
    let key = format!("bubbleId:{composer_id}:{bubble_id}");
    let raw = conn
        .prepare_cached("SELECT value FROM cursorDiskKV WHERE key = ?1")
        .and_then(|mut stmt| stmt.query_row([&key], |row| value_text(row, 0)).optional())
        .ok()
        .flatten()?;
    serde_json::from_str(&raw).ok()
}

fn matches_project(project: Option<&WorkspaceProject>, wanted: Option<&str>) -> bool {
    let Some(wanted) = wanted else {
        return true;
    };
    let wanted = wanted.trim_end_matches(['/', '\\']);
    project.is_some_and(|p| p.path.trim_end_matches(['/', '\\']) == wanted)
}

// ── Composer records ─────────────────────────────────────────

/// Fields shared by both composer shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposerMeta {
    #[serde(default)]
    pub composer_id: String,
    pub created_at: Option<i64>,
    pub last_updated_at: Option<i64>,
}

impl ComposerMeta {
    fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(from_millis)
    }

    fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated_at.and_then(from_millis)
    }
}

/// Bubble id and type, as listed by the versioned shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleHeader {
    pub bubble_id: String,
    #[serde(rename = "type")]
    pub kind: Option<u8>,
}

/// One conversation turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bubble {
    #[serde(rename = "type")]
    pub kind: Option<u8>,
    #[serde(default)]
    pub text: String,
    pub created_at: Option<Value>,
    pub timing_info: Option<TimingInfo>,
    pub model_info: Option<ModelInfo>,
    #[serde(default)]
    pub images: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingInfo {
    pub client_start_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model_name: Option<String>,
}

/// A `composerData:*` document, dispatched on its structural shape.
#[derive(Debug, Clone)]
pub enum ComposerRecord {
    /// Bubble text inline in a `conversation` array.
    Inline { meta: ComposerMeta, bubbles: Vec<Bubble> },
    /// Bubble headers only; bodies need a lookup per bubble.
    Headers { meta: ComposerMeta, headers: Vec<BubbleHeader> },
}

impl ComposerRecord {
    /// Determine the shape of a composer document.
    ///
    /// A `_v` version tag with a `fullConversationHeadersOnly` array selects
    /// the headers shape; otherwise a `conversation` array selects the
    /// inline shape. Anything else is `None`.
    #[must_use]
    pub fn classify(key: &str, value: &Value) -> Option<Self> {
        let mut meta: ComposerMeta = serde_json::from_value(value.clone()).ok()?;
        if meta.composer_id.is_empty() {
            meta.composer_id = key.strip_prefix(COMPOSER_KEY_PREFIX)?.to_string();
        }

        let headers = value.get("fullConversationHeadersOnly").filter(|v| v.is_array());
        if value.get("_v").is_some() {
            if let Some(headers) = headers {
                let headers = serde_json::from_value(headers.clone()).ok()?;
                return Some(Self::Headers { meta, headers });
            }
        }

        let conversation = value.get("conversation").filter(|v| v.is_array())?;
        // One bad bubble must not discard the whole conversation.
        let bubbles = conversation
            .as_array()?
            .iter()
            .filter_map(|b| serde_json::from_value(b.clone()).ok())
            .collect();
        Some(Self::Inline { meta, bubbles })
    }

    #[must_use]
    pub fn meta(&self) -> &ComposerMeta {
        match self {
            Self::Inline { meta, .. } | Self::Headers { meta, .. } => meta,
        }
    }

    #[must_use]
    pub fn composer_id(&self) -> &str {
        &self.meta().composer_id
    }

    /// Resolve every bubble in conversation order.
    ///
    /// For the headers shape `fetch` is called once per bubble; a `None`
    /// drops only that bubble.
    pub fn bubbles(&self, mut fetch: impl FnMut(&str) -> Option<Bubble>) -> Vec<Bubble> {
        match self {
            Self::Inline { bubbles, .. } => bubbles.clone(),
            Self::Headers { headers, .. } => headers
                .iter()
                .filter_map(|header| {
                    let mut bubble = fetch(&header.bubble_id)?;
                    if bubble.kind.is_none() {
                        bubble.kind = header.kind;
                    }
                    Some(bubble)
                })
                .collect(),
        }
    }
}

// ── Conversion ───────────────────────────────────────────────

fn build_draft(
    record: &ComposerRecord,
    bubbles: Vec<Bubble>,
    project: Option<&WorkspaceProject>,
    db_path: &Path,
    key: &str,
) -> Option<SessionDraft> {
    let meta = record.meta();
    let created = meta.created();
    let last_updated = meta.last_updated();

    let mut models = ModelTracker::default();
    let mut messages = Vec::new();
    let count = bubbles.len();

    for (i, bubble) in bubbles.into_iter().enumerate() {
        let role = match bubble.kind {
            Some(BUBBLE_USER) => Role::User,
            Some(BUBBLE_ASSISTANT) => Role::Assistant,
            _ => continue,
        };
        let fallback = if i + 1 == count {
            last_updated.or(created)
        } else {
            created
        };
        let Some(timestamp) = bubble_timestamp(&bubble).or(fallback) else {
            continue;
        };

        if role == Role::Assistant {
            if let Some(name) = bubble.model_info.as_ref().and_then(|m| m.model_name.as_deref()) {
                models.record(name);
            }
        }

        let content = bubble_content(bubble);
        if !content.is_empty() {
            messages.push(Message::new(role, content, timestamp));
        }
    }

    let timestamp = created.or_else(|| messages.first().map(|m| m.timestamp))?;
    let (project_path, project_name) = match project {
        Some(p) => (p.path.clone(), Some(p.name.clone())),
        None => (String::new(), None),
    };

    Some(SessionDraft {
        id: meta.composer_id.clone(),
        project_path,
        timestamp,
        messages,
        tool: Tool::Cursor,
        edited_files: BTreeSet::new(),
        languages: BTreeSet::new(),
        model_usage: models.finish(),
        plan_mode_exits: 0,
        provenance: Provenance::Database {
            path: db_path.to_path_buf(),
            key: key.to_string(),
        },
        project_name,
    })
}

fn bubble_content(bubble: Bubble) -> MessageContent {
    if bubble.images.is_empty() {
        return MessageContent::Text(bubble.text);
    }
    let mut parts = vec![ContentPart::Text { text: bubble.text }];
    parts.extend(bubble.images.iter().map(|_| ContentPart::Attachment {
        kind: AttachmentKind::Image,
    }));
    MessageContent::from_parts(parts)
}

fn bubble_timestamp(bubble: &Bubble) -> Option<DateTime<Utc>> {
    let created = match &bubble.created_at {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(from_millis),
        _ => None,
    };
    created.or_else(|| {
        let start = bubble.timing_info.as_ref()?.client_start_time?;
        // Whole milliseconds; fractional parts are sub-ms noise.
        #[allow(clippy::cast_possible_truncation)]
        let ms = start as i64;
        from_millis(ms)
    })
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const T0: i64 = 1_740_823_200_000; // 2025-03-01T10:00:00Z

    struct Fixture {
        conn: Connection,
        user_dir: PathBuf,
        _tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let user_dir = tmp.path().join("User");
            fs::create_dir_all(user_dir.join("globalStorage")).unwrap();
            let conn = Connection::open(user_dir.join("globalStorage").join("state.vscdb")).unwrap();
            conn.execute(
                "CREATE TABLE cursorDiskKV (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB)",
                [],
            )
            .unwrap();
            Self { conn, user_dir, _tmp: tmp }
        }

        fn put(&self, key: &str, value: &Value) {
            self.conn
                .execute(
                    "INSERT INTO cursorDiskKV (key, value) VALUES (?1, ?2)",
                    rusqlite::params![key, value.to_string().into_bytes()],
                )
                .unwrap();
        }

        fn workspace(&self, folder: &str, composers: &[&str]) {
            let dir = self.user_dir.join("workspaceStorage").join("ws1");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("workspace.json"), json!({ "folder": folder }).to_string()).unwrap();
            let conn = Connection::open(dir.join("state.vscdb")).unwrap();
            conn.execute("CREATE TABLE ItemTable (key TEXT UNIQUE, value BLOB)", [])
                .unwrap();
            let all: Vec<_> = composers.iter().map(|id| json!({ "composerId": id })).collect();
            conn.execute(
                "INSERT INTO ItemTable (key, value) VALUES ('composer.composerData', ?1)",
                [json!({ "allComposers": all }).to_string()],
            )
            .unwrap();
        }

        fn reader(&self) -> CursorReader {
            CursorReader::new(&self.user_dir)
        }
    }

    fn inline_composer(id: &str) -> Value {
        json!({
            "composerId": id,
            "createdAt": T0,
            "lastUpdatedAt": T0 + 600_000,
            "conversation": [
                { "type": 1, "bubbleId": "b1", "text": "refactor the router", "timingInfo": { "clientStartTime": T0 } },
                { "type": 2, "bubbleId": "b2", "text": "done", "modelInfo": { "modelName": "gpt-4o" },
                  "timingInfo": { "clientStartTime": T0 + 600_000 } }
            ]
        })
    }

    #[test]
    fn test_missing_database_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = CursorReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[test]
    fn test_classify_shapes() {
        let inline = ComposerRecord::classify("composerData:a", &inline_composer("a")).unwrap();
        assert!(matches!(inline, ComposerRecord::Inline { .. }));

        let headers = json!({ "_v": 3, "composerId": "b", "fullConversationHeadersOnly": [{ "bubbleId": "x", "type": 1 }] });
        let headers = ComposerRecord::classify("composerData:b", &headers).unwrap();
        assert!(matches!(headers, ComposerRecord::Headers { .. }));

        assert!(ComposerRecord::classify("composerData:c", &json!({ "composerId": "c" })).is_none());
    }

    #[test]
    fn test_reads_inline_composer_with_project() {
        let fx = Fixture::new();
        fx.put("composerData:c1", &inline_composer("c1"));
        fx.workspace("file:///home/dev/shop-api", &["c1"]);

        let outcome = fx.reader().read_sessions(&ReadOptions::default()).unwrap();
        assert_eq!(outcome.sessions.len(), 1);
        let session = &outcome.sessions[0];
        assert_eq!(session.tool, Tool::Cursor);
        assert_eq!(session.project_name, "shop-api");
        assert_eq!(session.duration, 600);
        assert_eq!(session.model_usage.as_ref().unwrap().primary_model, "gpt-4o");
        assert_eq!(session.file_edit_count, 0);
    }

    #[test]
    fn test_headers_composer_drops_missing_bubble_only() {
        let fx = Fixture::new();
        fx.put(
            "composerData:c2",
            &json!({
                "_v": 3,
                "composerId": "c2",
                "createdAt": T0,
                "fullConversationHeadersOnly": [
                    { "bubbleId": "u1", "type": 1 },
                    { "bubbleId": "gone", "type": 2 },
                    { "bubbleId": "a1", "type": 2 }
                ]
            }),
        );
        fx.put(
            "bubbleId:c2:u1",
            &json!({ "type": 1, "text": "why is this slow", "createdAt": "2025-03-01T10:00:00Z" }),
        );
        fx.put(
            "bubbleId:c2:a1",
            &json!({ "type": 2, "text": "missing index", "createdAt": "2025-03-01T10:05:00Z" }),
        );

        let outcome = fx.reader().read_sessions(&ReadOptions::default()).unwrap();
        let session = &outcome.sessions[0];
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.duration, 300);
        assert_eq!(outcome.skipped_records, 1);
        assert_eq!(session.project_name, "Unknown project");
    }

    #[test]
    fn test_unparseable_records_are_skipped() {
        let fx = Fixture::new();
        fx.put("composerData:good", &inline_composer("good"));
        fx.conn
            .execute(
                "INSERT INTO cursorDiskKV (key, value) VALUES ('composerData:bad', '{oops')",
                [],
            )
            .unwrap();

        let outcome = fx.reader().read_sessions(&ReadOptions::default()).unwrap();
        assert_eq!(outcome.sessions.len(), 1);
        assert_eq!(outcome.skipped_files, 1);
    }

    #[test]
    fn test_missing_table_is_empty() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("globalStorage");
        fs::create_dir_all(&global).unwrap();
        Connection::open(global.join("state.vscdb"))
            .unwrap()
            .execute("CREATE TABLE ItemTable (key TEXT, value BLOB)", [])
            .unwrap();

        let outcome = CursorReader::new(tmp.path())
            .read_sessions(&ReadOptions::default())
            .unwrap();
        assert!(outcome.sessions.is_empty());
    }

    #[test]
    fn test_since_and_project_filters() {
        let fx = Fixture::new();
        fx.put("composerData:c1", &inline_composer("c1"));
        fx.workspace("file:///home/dev/shop-api", &["c1"]);

        let after = ReadOptions {
            since: from_millis(T0 + 3_600_000),
            project_path: None,
        };
        assert!(fx.reader().read_sessions(&after).unwrap().sessions.is_empty());

        let other = ReadOptions {
            since: None,
            project_path: Some("/home/dev/blog".into()),
        };
        assert!(fx.reader().read_sessions(&other).unwrap().sessions.is_empty());

        let same = ReadOptions {
            since: None,
            project_path: Some("/home/dev/shop-api/".into()),
        };
        assert_eq!(fx.reader().read_sessions(&same).unwrap().sessions.len(), 1);
    }
}
