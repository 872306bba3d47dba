use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title assigned to sessions before the first turn generates a real one.
pub const DEFAULT_SESSION_TITLE: &str = "New Research";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Tool invocation observed during an assistant turn (from `node` events).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Locally generated, stable for the lifetime of one turn.
    pub id: String,
    pub role: Role,
    pub content: String,
    /// True while content may still change.
    pub streaming: bool,
    /// Committed thinking blocks, append-only once committed.
    #[serde(default)]
    pub thinking_steps: Vec<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            streaming: false,
            thinking_steps: Vec::new(),
            tool_calls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Empty assistant message created the moment a turn first needs one.
    pub fn streaming_assistant() -> Self {
        let mut message = Self::new(Role::Assistant, "");
        message.streaming = true;
        message
    }
}

/// Phase metadata published by `phase_start` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseInfo {
    pub name: String,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    /// Human-readable progress indicator; None when no turn is running.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub phase: Option<PhaseInfo>,
}

impl Session {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
            status: None,
            phase: None,
        }
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
