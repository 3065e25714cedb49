//! Message model.
//!
//! A message is one turn of a recorded conversation. Content is either
//! plain text or a list of parts, where binary payloads have already been
//! reduced to attachment markers by the reader that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Parse a role name as written in session logs.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" | "human" => Some(Self::User),
            "assistant" | "ai" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Kind of non-text payload that was dropped from a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
}

/// One element of structured message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Attachment { kind: AttachmentKind },
}

/// Message content: plain text, or text mixed with attachment markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Build content from parts, simplifying to `Text` when there are no attachments.
    #[must_use]
    pub fn from_parts(parts: Vec<ContentPart>) -> Self {
        if parts.iter().all(|p| matches!(p, ContentPart::Text { .. })) {
            let texts: Vec<String> = parts
                .into_iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text),
                    ContentPart::Attachment { .. } => None,
                })
                .collect();
            Self::Text(texts.join("\n"))
        } else {
            Self::Parts(parts)
        }
    }

    /// True when there is neither text nor any attachment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Parts(parts) => parts.iter().all(|p| match p {
                ContentPart::Text { text } => text.trim().is_empty(),
                ContentPart::Attachment { .. } => false,
            }),
        }
    }

    /// Flatten to text, summarising attachments as `[N image attachment(s)]`.
    #[must_use]
    pub fn collapse(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => {
                let mut texts = Vec::new();
                let mut images = 0usize;
                let mut documents = 0usize;
                for part in parts {
                    match part {
                        ContentPart::Text { text } if !text.trim().is_empty() => {
                            texts.push(text.as_str());
                        }
                        ContentPart::Text { .. } => {}
                        ContentPart::Attachment { kind: AttachmentKind::Image } => images += 1,
                        ContentPart::Attachment { kind: AttachmentKind::Document } => {
                            documents += 1;
                        }
                    }
                }

                let mut out = texts.join("\n");
                for (count, label) in [(images, "image"), (documents, "document")] {
                    if count > 0 {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(&format!("[{}]", attachment_placeholder(count, label)));
                    }
                }
                out
            }
        }
    }
}

/// Short textual stand-in for dropped binary payloads.
#[must_use]
pub fn attachment_placeholder(count: usize, label: &str) -> String {
    format!("{count} {label} attachment(s)")
}

/// A single parsed message. Immutable once a reader has produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: MessageContent, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content,
            timestamp,
        }
    }

    /// Convenience constructor for plain-text messages.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(role, MessageContent::Text(text.into()), timestamp)
    }
}
