//! Session readers.
//!
//! Each reader turns one on-disk log format into canonical [`Session`]s:
//!
//! - **Claude Code** ([`ClaudeReader`]) - per-project directories of
//!   line-delimited JSON logs, one file per session
//! - **Cursor** ([`CursorReader`]) - a SQLite key-value store holding
//!   conversation blobs in two schema variants
//!
//! # Contract
//!
//! Given [`ReadOptions`] (an optional `since` and project filter), a reader
//! returns sessions sorted ascending by start timestamp. Individual bad
//! records or files are skipped and counted in [`ReadOutcome`]; only a
//! missing source surfaces as an error.

mod claude;
mod cursor;
mod workspace;

pub use claude::{encode_project_dir, ClaudeReader};
pub use cursor::{Bubble, BubbleHeader, ComposerMeta, ComposerRecord, CursorReader};
pub use workspace::{decode_file_uri, load_composer_projects, WorkspaceProject};

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::error::Result;
use crate::model::{Session, Tool};

/// Filters applied while reading.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Only sessions that started strictly after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only sessions recorded in this project directory.
    pub project_path: Option<String>,
}

impl ReadOptions {
    /// True if `timestamp` passes the `since` filter.
    #[must_use]
    pub fn is_after_since(&self, timestamp: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| timestamp > since)
    }
}

/// Sessions read from a source plus diagnostics about what was skipped.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub sessions: Vec<Session>,
    /// Files (or conversation records) that could not be parsed at all.
    pub skipped_files: usize,
    /// Individual malformed lines or blobs inside otherwise readable sources.
    pub skipped_records: usize,
}

impl ReadOutcome {
    /// Sort sessions ascending by start timestamp.
    pub fn sort(&mut self) {
        self.sessions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }
}

/// A local store of recorded sessions.
pub trait SessionSource {
    /// The assistant whose logs this source reads.
    fn tool(&self) -> Tool;

    /// Read every session matching `options`.
    ///
    /// # Errors
    ///
    /// Returns `Error::SourceNotFound` if the source root or database is missing.
    fn read_sessions(&self, options: &ReadOptions) -> Result<ReadOutcome>;
}

/// Programming language for an edited file, derived from its extension.
#[must_use]
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let language = match ext.as_str() {
        "rs" => "Rust",
        "ts" | "tsx" | "mts" | "cts" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "py" | "pyi" => "Python",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "swift" => "Swift",
        "rb" => "Ruby",
        "php" => "PHP",
        "c" | "h" => "C",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "C++",
        "cs" => "C#",
        "scala" => "Scala",
        "dart" => "Dart",
        "ex" | "exs" => "Elixir",
        "sh" | "bash" | "zsh" => "Shell",
        "sql" => "SQL",
        "html" | "htm" => "HTML",
        "css" | "scss" | "sass" | "less" => "CSS",
        "vue" => "Vue",
        "svelte" => "Svelte",
        "md" | "mdx" => "Markdown",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        _ => return None,
    };
    Some(language)
}
