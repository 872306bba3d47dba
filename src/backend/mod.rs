//! Backend collaborator boundary.
//!
//! Everything the core needs from the research backend goes through the
//! [`ChatBackend`] trait: opening the chat stream for a turn, best-effort
//! title generation, and the plain request/response session persistence
//! calls. The HTTP implementation lives in [`http`].

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::util::errors::ChatResult;

pub use http::{HttpBackendConfig, HttpChatBackend};

/// Raw byte chunks of one open chat stream, in arrival order.
pub type ByteStream = BoxStream<'static, anyhow::Result<Bytes>>;

/// Outbound request opening one turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurnRequest {
    pub message: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub message_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionSummary>,
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open the event channel for one turn.
    async fn open_chat(&self, request: &ChatTurnRequest) -> ChatResult<ByteStream>;

    /// Ask the backend for a session title. Callers treat failure as
    /// recoverable and fall back locally.
    async fn generate_title(&self, message: &str) -> ChatResult<String>;

    async fn list_sessions(&self) -> ChatResult<SessionList>;

    async fn session_detail(&self, session_id: &str) -> ChatResult<SessionDetail>;

    /// Returns the new session id.
    async fn create_session(&self) -> ChatResult<String>;

    async fn rename_session(&self, session_id: &str, title: &str) -> ChatResult<()>;

    async fn delete_session(&self, session_id: &str) -> ChatResult<()>;
}
