//! Typed event vocabulary and payload classification.
//!
//! The wire vocabulary is closed: every `type` discriminant the backend can
//! emit maps onto one variant here, synonyms folded together with serde
//! aliases. Anything outside the vocabulary classifies as [`StreamEvent::Unknown`]
//! (silently ignorable, forward-compatible); a payload that fails structural
//! parsing classifies as [`Classified::Malformed`] and is logged, never
//! propagated - unless it is an `error` payload, which stays fatal even when
//! its shape is off.

use log::warn;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Session id echo; no state effect beyond logging.
    Session { session_id: String },

    /// Incremental content delta.
    #[serde(alias = "text_stream")]
    Text { content: String },

    /// Human-readable progress line.
    Status { content: String },

    PhaseStart {
        #[serde(default)]
        phase: Option<String>,
        #[serde(default)]
        number: Option<u32>,
        #[serde(default)]
        total: Option<u32>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    PhaseComplete {
        #[serde(default)]
        phase: Option<String>,
        #[serde(default)]
        search_count: Option<u32>,
    },

    #[serde(alias = "search_status")]
    Search {
        #[serde(default)]
        number: Option<u32>,
    },
    SearchComplete {
        #[serde(default)]
        total: Option<u32>,
    },

    /// Streaming clarification draft: supersedes prior content, turn stays open.
    ClarificationStream { content: String },

    /// Final clarification question: supersedes prior content, turn ends.
    #[serde(alias = "clarification_needed")]
    Clarification {
        content: String,
        #[serde(default)]
        phase: Option<String>,
    },

    /// Mid-research feedback prompt; appends and keeps the turn open.
    FeedbackRequest {
        content: String,
        #[serde(default)]
        phase: Option<String>,
    },

    /// Closing remark appended after the main content.
    CompletionMessage { content: String },

    #[serde(alias = "followup_complete")]
    Followup { content: String },

    Navigation {
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },

    ResearchComplete {
        report: String,
        #[serde(default)]
        topic: Option<String>,
    },

    /// Authoritative terminal content; always wins over prior partials.
    FinalResponse { content: String },

    /// Structured sub-event from a graph node (reasoning/tool/reflection/response).
    Node {
        node: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        tool: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },

    /// Reasoning monologue fragment.
    Thinking { content: String },
    /// Reasoning segment boundary: commits the pending fragment buffer.
    ThinkingStart,
    /// Content-block boundary: also commits the pending fragment buffer.
    BlockStop,

    #[serde(alias = "refinement")]
    RefinementComplete {
        #[serde(default)]
        phase: Option<String>,
    },

    /// Terminal event for the turn. The `complete` form may carry a closing
    /// remark in `content`; plain `done` never does.
    #[serde(alias = "complete")]
    Done {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },

    /// Fatal backend error; aborts the turn.
    Error { message: String },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Event(StreamEvent),
    /// Structurally unparseable payload; logged and skipped by the caller.
    Malformed,
}

/// Map one frame payload to a typed event. Never fails to the caller.
pub fn classify(payload: &str) -> Classified {
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Classified::Event(event),
        Err(e) => {
            // An error payload must abort the turn even when its shape is
            // not the expected one.
            if let Ok(value) = serde_json::from_str::<Value>(payload) {
                if value.get("type").and_then(Value::as_str) == Some("error") {
                    let message = value
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("The backend reported an unspecified error")
                        .to_string();
                    return Classified::Event(StreamEvent::Error { message });
                }
            }
            warn!("Skipping malformed stream payload: {}, payload: {}", e, payload);
            Classified::Malformed
        }
    }
}
