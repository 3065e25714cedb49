//! Cursor workspace → project mapping.
//!
//! Cursor's conversation store does not record which project a composer
//! belongs to. Each `workspaceStorage/<hash>/` directory has a
//! `workspace.json` naming the opened folder and its own `state.vscdb`
//! whose `ItemTable` lists the composers created in that workspace.

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::cursor::value_text;
use crate::error::Result;
use crate::model::project_display_name;

/// `ItemTable` key listing a workspace's composers.
const COMPOSER_INDEX_KEY: &str = "composer.composerData";

/// Project a composer was created in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceProject {
    pub path: String,
    pub name: String,
}

#[derive(Deserialize)]
struct WorkspaceFile {
    folder: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposerIndex {
    #[serde(default)]
    all_composers: Vec<ComposerEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposerEntry {
    composer_id: String,
}

/// Build a composer-id → project map from every workspace directory.
///
/// Unreadable workspaces are skipped. A missing `workspaceStorage`
/// directory yields an empty map.
pub fn load_composer_projects(workspace_storage: &Path) -> HashMap<String, WorkspaceProject> {
    let mut map = HashMap::new();

    let Ok(entries) = fs::read_dir(workspace_storage) else {
        debug!(dir = %workspace_storage.display(), "No workspaceStorage directory");
        return map;
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        match read_workspace(&dir) {
            Ok(Some((project, composer_ids))) => {
                for id in composer_ids {
                    map.insert(id, project.clone());
                }
            }
            Ok(None) => {}
            Err(e) => debug!(dir = %dir.display(), error = %e, "Skipping unreadable workspace"),
        }
    }

    map
}

fn read_workspace(dir: &Path) -> Result<Option<(WorkspaceProject, Vec<String>)>> {
    let workspace_json = dir.join("workspace.json");
    let db_path = dir.join("state.vscdb");
    if !workspace_json.is_file() || !db_path.is_file() {
        return Ok(None);
    }

    let file: WorkspaceFile = serde_json::from_str(&fs::read_to_string(&workspace_json)?)?;
    // Multi-root workspaces have `workspace` instead of `folder`.
    let Some(path) = file.folder.as_deref().and_then(decode_file_uri) else {
        return Ok(None);
    };

    let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let raw = conn
        .query_row(
            "SELECT value FROM ItemTable WHERE key = ?1",
            [COMPOSER_INDEX_KEY],
            |row| value_text(row, 0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    let index: ComposerIndex = serde_json::from_str(&raw)?;
    let ids = index.all_composers.into_iter().map(|c| c.composer_id).collect();
    let name = project_display_name(&path);

    Ok(Some((WorkspaceProject { path, name }, ids)))
}

/// Decode a `file://` URI to a filesystem path.
///
/// Handles percent-encoding and Windows drive letters
/// (`file:///c%3A/code/app` → `c:/code/app`). Returns `None` for other schemes.
#[must_use]
pub fn decode_file_uri(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("file://")?;
    let decoded = percent_decode(rest);

    let bytes = decoded.as_bytes();
    let is_drive = bytes.len() >= 3
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2] == b':';
    if is_drive {
        return Some(decoded[1..].to_string());
    }
    Some(decoded)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
