//! Error types for sessync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 5=auth, etc.)
//! - Transient classification for the upload retry policy
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sessync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Hooks and scripts match on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,

    // Not Found (exit 3)
    SourceNotFound,

    // Validation (exit 4)
    NoQualifyingSessions,
    InvalidArgument,

    // Auth (exit 5)
    AuthRequired,

    // Upload (exit 6)
    NetworkError,
    ServerError,
    ClientError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SourceNotFound => "SOURCE_NOT_FOUND",
            Self::NoQualifyingSessions => "NO_QUALIFYING_SESSIONS",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::ClientError => "CLIENT_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError => 2,
            Self::SourceNotFound => 3,
            Self::NoQualifyingSessions | Self::InvalidArgument => 4,
            Self::AuthRequired => 5,
            Self::NetworkError | Self::ServerError | Self::ClientError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether running the same sync again later may succeed.
    ///
    /// True for connection failures and 5xx responses. False for auth,
    /// client (4xx), validation and local errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::ServerError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in sessync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{source_name} data not found at {path}")]
    SourceNotFound { source_name: String, path: PathBuf },

    #[error("All {filtered} session(s) were shorter than {min_secs} seconds; nothing to upload")]
    NoQualifyingSessions { filtered: usize, min_secs: u64 },

    #[error("Not authenticated: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SourceNotFound { .. } => ErrorCode::SourceNotFound,
            Self::NoQualifyingSessions { .. } => ErrorCode::NoQualifyingSessions,
            Self::Auth(_) => ErrorCode::AuthRequired,
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Server { .. } => ErrorCode::ServerError,
            Self::Client { .. } => ErrorCode::ClientError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Network-class and 5xx failures. The orchestrator retries these once.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::SourceNotFound { source_name, path } => Some(format!(
                "No {source_name} data at {}. Pass --claude-dir / --cursor-dir if it lives elsewhere.",
                path.display()
            )),

            Self::NoQualifyingSessions { min_secs, .. } => Some(format!(
                "Only sessions of at least {} minutes are uploaded. Keep working and sync again later.",
                min_secs / 60
            )),

            Self::Auth(_) => Some(
                "Set SESSYNC_TOKEN or add a \"token\" to ~/.sessync/config.json".to_string(),
            ),

            Self::Network(_) | Self::Server { .. } => {
                Some("The upload service is unreachable right now. Try again later.".to_string())
            }

            Self::Client { status: 429, .. } => {
                Some("Rate limited by the upload service. Wait a minute and retry.".to_string())
            }

            Self::Client { .. } | Self::Database(_) | Self::Io(_) | Self::Json(_)
            | Self::InvalidArgument(_) | Self::Config(_) | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
