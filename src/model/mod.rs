//! Data models for sessync.
//!
//! This module contains the canonical domain models every reader produces:
//! - Message (role, content, timestamp)
//! - Session (messages plus derived duration, edits, languages, model usage)

pub mod message;
pub mod session;

pub use message::{attachment_placeholder, AttachmentKind, ContentPart, Message, MessageContent, Role};
pub use session::{
    project_display_name, session_duration, ModelTracker, ModelUsage, Provenance, Session,
    SessionDraft, Tool,
};
