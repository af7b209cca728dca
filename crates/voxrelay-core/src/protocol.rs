//! Wire messages exchanged between the origin and consumer sides.
//!
//! Every frame on the fragment channel is a JSON envelope
//! `{ "event": <name>, "data": <payload> }`. The consumer sends `message`
//! (a new utterance) and `abort` (cancellation); the origin answers with
//! `message` frames carrying one fragment each.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque conversation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One segmented fragment of a model answer (origin → consumer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentMessage {
    pub sentence: String,
    pub conversation_id: ConversationId,
    pub index: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub last: bool,
}

/// A finalized user utterance (consumer → origin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceMessage {
    pub message: String,
    pub conversation_id: ConversationId,
}

impl UtteranceMessage {
    /// Build an utterance, truncating the text to `max_chars` characters
    pub fn new(message: &str, conversation_id: ConversationId, max_chars: usize) -> Self {
        Self {
            message: truncate_chars(message, max_chars).to_string(),
            conversation_id,
        }
    }
}

/// Cancellation request (consumer → origin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelMessage {
    pub conversation_id: ConversationId,
}

/// Frames sent by the consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Message(UtteranceMessage),
    Abort(CancelMessage),
}

/// Frames sent by the origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Message(FragmentMessage),
}

/// Longest prefix of `text` holding at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
