//! Session and message types
//!
//! Core data model for conversations: sessions, chat messages, and the
//! metadata attached to assistant replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intent::Intent;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// Metadata attached to assistant replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Model that produced the reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    /// Intent the message was routed under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Whether the client should render the medical disclaimer
    #[serde(default)]
    pub show_disclaimer: bool,
}

/// One message in a conversation.
///
/// `seq` is assigned by the store on append and is the sole ordering key
/// for history; it is `None` only before the message is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Store-assigned position within the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    /// True while the message is still being streamed to the client
    #[serde(default)]
    pub is_streaming: bool,
    /// True for error notices delivered in place of a reply
    #[serde(default)]
    pub is_error: bool,
}

impl ChatMessage {
    fn base(session_id: &str, user_id: &str, sender: Sender, text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            sender,
            text: text.to_string(),
            timestamp: Utc::now(),
            seq: None,
            metadata: None,
            is_streaming: false,
            is_error: false,
        }
    }

    /// A message authored by the user.
    pub fn user(session_id: &str, user_id: &str, text: &str) -> Self {
        Self::base(session_id, user_id, Sender::User, text)
    }

    /// An assistant reply.
    pub fn bot(session_id: &str, user_id: &str, text: &str) -> Self {
        Self::base(session_id, user_id, Sender::Bot, text)
    }

    /// The shell of a streamed assistant reply. Created before the first
    /// chunk so every frame of the stream shares the final message's id;
    /// text and metadata are filled in at completion.
    pub fn streaming(session_id: &str, user_id: &str) -> Self {
        let mut msg = Self::base(session_id, user_id, Sender::Bot, "");
        msg.is_streaming = true;
        msg
    }

    /// An error notice delivered in place of a reply.
    pub fn error(session_id: &str, user_id: &str, text: &str) -> Self {
        let mut msg = Self::base(session_id, user_id, Sender::Bot, text);
        msg.is_error = true;
        msg
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A conversation between one user and the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    /// Derived from the first completed reply; set once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: None,
            summary: None,
            created_at: now,
            last_activity: now,
        }
    }
}

/// Maximum length of a derived session title.
const TITLE_MAX_CHARS: usize = 60;

/// Derive a session title from the first completed reply.
///
/// Takes the first sentence and truncates at a word boundary, appending an
/// ellipsis when anything was cut.
pub fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "New conversation".to_string();
    }

    let first_sentence = trimmed
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(trimmed)
        .trim_end_matches(['.', '!', '?'])
        .trim();

    if first_sentence.chars().count() <= TITLE_MAX_CHARS {
        return first_sentence.to_string();
    }

    let mut title = String::new();
    for word in first_sentence.split_whitespace() {
        let candidate_len = if title.is_empty() {
            word.chars().count()
        } else {
            title.chars().count() + 1 + word.chars().count()
        };
        if candidate_len > TITLE_MAX_CHARS {
            break;
        }
        if !title.is_empty() {
            title.push(' ');
        }
        title.push_str(word);
    }

    // A single word longer than the limit gets a hard cut.
    if title.is_empty() {
        title = first_sentence.chars().take(TITLE_MAX_CHARS).collect();
    }

    title.push('…');
    title
}
