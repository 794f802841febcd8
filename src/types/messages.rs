//! Message types for a vendor-neutral conversation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::tools::{ToolCall, ToolResult};

/// Kind of file attached to a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Plain text file
    Text,
    /// Saved web page, already reduced to text
    Webpage,
    /// Raster image
    Image,
    /// PDF document
    Pdf,
}

impl AttachmentKind {
    /// Get string representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Text => "text",
            AttachmentKind::Webpage => "webpage",
            AttachmentKind::Image => "image",
            AttachmentKind::Pdf => "pdf",
        }
    }
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file the caller attached to a user message.
///
/// The locator is read once per turn while encoding; the attachment itself is
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// What the file contains
    pub kind: AttachmentKind,
    /// Where the bytes live
    pub locator: PathBuf,
    /// Name shown to the user and to the model
    pub name: String,
}

impl Attachment {
    /// Create a new attachment
    pub fn new<P: Into<PathBuf>, S: Into<String>>(kind: AttachmentKind, locator: P, name: S) -> Self {
        Self {
            kind,
            locator: locator.into(),
            name: name.into(),
        }
    }
}

/// A single message in a conversation.
///
/// Role alternation is not enforced: consecutive messages of the same kind
/// are passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// Message from the user, optionally with attachments
    User {
        content: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    /// Message produced by a model, optionally proposing tool calls
    Assistant {
        content: String,
        #[serde(default)]
        model_id: Option<String>,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    /// Results of tool calls executed by the caller
    ToolResults { results: Vec<ToolResult> },
}

impl Message {
    /// Create a new user message with text content
    pub fn user<S: Into<String>>(text: S) -> Self {
        Message::User {
            content: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Create a new user message carrying attachments
    pub fn user_with_attachments<S: Into<String>>(text: S, attachments: Vec<Attachment>) -> Self {
        Message::User {
            content: text.into(),
            attachments,
        }
    }

    /// Create a new assistant message with text content
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Message::Assistant {
            content: text.into(),
            model_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message that proposed tool calls
    pub fn assistant_with_calls<S: Into<String>>(text: S, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: text.into(),
            model_id: None,
            tool_calls,
        }
    }

    /// Create a message carrying tool results
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Message::ToolResults { results }
    }

    /// Attachments carried by this message (empty for non-user messages)
    pub fn attachments(&self) -> &[Attachment] {
        match self {
            Message::User { attachments, .. } => attachments,
            _ => &[],
        }
    }

    /// Check if this message carries any attachment
    pub fn has_attachments(&self) -> bool {
        !self.attachments().is_empty()
    }
}

/// An ordered sequence of messages
pub type Conversation = Vec<Message>;
