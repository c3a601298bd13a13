//! Data models shared by the transport, the request facade and persisted state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::client::ClientError;

/// Upper bound on message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Conversation memory slot used when the caller doesn't pick one.
pub const DEFAULT_MEMORY_ID: u32 = 1;

/// Title given to a session until its first user message names it.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat Session";

/// A validated request to open a stream session.
///
/// Immutable once built; the message is guaranteed non-empty and within
/// [`MAX_MESSAGE_CHARS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    message: String,
    memory_id: u32,
}

impl StreamRequest {
    /// Create a request for the default memory slot.
    pub fn new(message: impl Into<String>) -> Result<Self, ClientError> {
        let message = message.into();
        validate_message(&message)?;
        Ok(Self {
            message,
            memory_id: DEFAULT_MEMORY_ID,
        })
    }

    /// Use a specific conversation memory slot.
    pub fn with_memory_id(mut self, memory_id: u32) -> Self {
        self.memory_id = memory_id;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn memory_id(&self) -> u32 {
        self.memory_id
    }
}

pub(crate) fn validate_message(message: &str) -> Result<(), ClientError> {
    let len = message.trim().chars().count();
    if len == 0 {
        return Err(ClientError::InvalidRequest("message is empty".to_string()));
    }
    if len > MAX_MESSAGE_CHARS {
        return Err(ClientError::InvalidRequest(format!(
            "message is {} characters, limit is {}",
            len, MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}

/// One decoded logical unit of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Unescaped payload text.
    Data(String),

    /// End-of-stream sentinel.
    Terminal,
}

/// Structured learning recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningReport {
    pub student_name: String,
    pub recommendations: Vec<String>,
}

/// Knowledge-base answer with the documents it drew from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseResult {
    pub content: String,
    pub sources: Vec<ContentSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSource {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
    System,
}

/// What produced a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Chat,
    Report,
    Knowledge,
    Error,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    #[default]
    General,
    Learning,
    Interview,
}

/// A persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub last_activity: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: SessionKind,
}

impl ChatSession {
    /// Start an empty general session stamped with the current time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: format!(
                "session_{}_{}",
                now.timestamp_millis(),
                &Uuid::new_v4().simple().to_string()[..6]
            ),
            title: DEFAULT_SESSION_TITLE.to_string(),
            messages: Vec::new(),
            last_activity: now,
            kind: SessionKind::General,
        }
    }

    /// Find a message by id for in-place updates.
    pub fn message_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// User preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub auto_save: bool,
    pub enable_notifications: bool,
    pub show_timestamps: bool,
    pub theme: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_save: true,
            enable_notifications: false,
            show_timestamps: true,
            theme: "windows95".to_string(),
        }
    }
}
