//! Transcript reducer: folds classified events into session state.
//!
//! One reducer instance lives for one assistant turn. It owns the locally
//! generated message id, the thinking accumulator and the turn flags; every
//! event is applied synchronously against the session it is handed, in
//! arrival order. Each event kind has its own precedence rule over the
//! message content - replace-style events supersede everything before them,
//! append-style events extend, status-style events never touch content.
//!
//! Duplicate-delivery policy: replace-style events are naturally idempotent;
//! append-style events rely on the ordered at-most-once delivery of a single
//! open channel, so duplicates there are a documented don't-care; terminal
//! side effects are guarded by once-flags.

use log::{debug, trace};

use crate::session::types::{Message, PhaseInfo, Session, ToolCallRecord};
use crate::stream::event::StreamEvent;
use crate::stream::thinking::ThinkingAccumulator;

/// Reflection text at or below this trimmed length is tool-internal status
/// noise: it becomes a thinking step but never message content.
pub const REFLECTION_CONTENT_MIN_CHARS: usize = 120;

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Continue,
    /// Terminal event observed; the turn is over.
    Done,
    /// Explicit backend error; the turn is aborted with this message.
    Fatal(String),
}

#[derive(Debug, Default)]
pub struct TurnReducer {
    /// Generated once when the turn first needs a message, reused for every
    /// later update within the turn.
    message_id: Option<String>,
    thinking: ThinkingAccumulator,
    content_set: bool,
    finalized: bool,
    done_seen: bool,
}

impl TurnReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// True once any event has set message content.
    pub fn content_set(&self) -> bool {
        self.content_set
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Uncommitted thinking fragments.
    pub fn thinking_buffer(&self) -> &str {
        self.thinking.buffer()
    }

    /// Apply one classified event to the session. Synchronous; never
    /// suspends.
    pub fn apply(&mut self, session: &mut Session, event: StreamEvent) -> Applied {
        match event {
            StreamEvent::Session { session_id } => {
                debug!("Backend echoed session id: {}", session_id);
            }
            StreamEvent::Text { content } => {
                self.append_content(session, &content);
            }
            StreamEvent::Status { content } => {
                session.status = Some(content);
            }
            StreamEvent::PhaseStart {
                phase,
                number,
                total,
                title,
                description,
            } => {
                let name = phase
                    .or_else(|| title.clone())
                    .unwrap_or_else(|| "research".to_string());
                let label = title.or(description).unwrap_or_else(|| name.clone());
                session.status = Some(match (number, total) {
                    (Some(n), Some(t)) => format!("Phase {}/{}: {}", n, t, label),
                    _ => label,
                });
                session.phase = Some(PhaseInfo { name, number, total });
            }
            StreamEvent::PhaseComplete { phase, search_count } => {
                let label = phase.unwrap_or_else(|| "Phase".to_string());
                session.status = Some(match search_count {
                    Some(n) => format!("{} complete ({} searches)", label, n),
                    None => format!("{} complete", label),
                });
            }
            StreamEvent::Search { number } => {
                session.status = Some(match number {
                    Some(n) => format!("Searching the web (#{})", n),
                    None => "Searching the web...".to_string(),
                });
            }
            StreamEvent::SearchComplete { total } => {
                session.status = Some(match total {
                    Some(t) => format!("Search complete ({} searches)", t),
                    None => "Search complete".to_string(),
                });
            }
            StreamEvent::ClarificationStream { content } => {
                // Supersedes prior content wholesale; the turn stays open.
                self.replace_content(session, content);
            }
            StreamEvent::Clarification { content, phase } => {
                if let Some(phase) = phase {
                    trace!("Clarification raised during phase: {}", phase);
                }
                self.replace_content(session, content);
                self.finalize(session);
            }
            StreamEvent::FeedbackRequest { content, .. } => {
                // Continuation: extends the transcript, turn stays open.
                self.append_section(session, &content);
            }
            StreamEvent::CompletionMessage { content } => {
                // Continuation rule: closing remark appends after the body.
                self.append_section(session, &content);
                self.finalize(session);
            }
            StreamEvent::Followup { content } => {
                self.replace_content(session, content);
                self.finalize(session);
            }
            StreamEvent::Navigation { to, content } => {
                if let Some(to) = to {
                    debug!("Navigation to phase: {}", to);
                }
                if let Some(content) = content {
                    self.replace_content(session, content);
                }
                self.finalize(session);
            }
            StreamEvent::ResearchComplete { report, topic } => {
                if let Some(topic) = topic {
                    debug!("Research complete for topic: {}", topic);
                }
                self.replace_content(session, report);
                self.finalize(session);
            }
            StreamEvent::FinalResponse { content } => {
                // Authoritative: wins even over an already-finalized message.
                self.replace_content(session, content);
                self.finalize(session);
            }
            StreamEvent::Node {
                node,
                content,
                tool,
                status,
            } => {
                self.apply_node(session, &node, content, tool, status);
            }
            StreamEvent::Thinking { content } => {
                self.thinking.push(&content);
            }
            StreamEvent::ThinkingStart | StreamEvent::BlockStop => {
                self.commit_thinking(session);
            }
            StreamEvent::RefinementComplete { phase } => {
                session.status = Some(match phase {
                    Some(p) => format!("Refined {}", p),
                    None => "Refinement complete".to_string(),
                });
            }
            StreamEvent::Done { session_id, content } => {
                if self.done_seen {
                    trace!("Duplicate terminal event ignored");
                    return Applied::Continue;
                }
                if let Some(session_id) = session_id {
                    trace!("Turn done for session: {}", session_id);
                }
                self.done_seen = true;
                self.commit_thinking(session);
                // The `complete` form can carry a closing remark that belongs
                // after the body.
                if let Some(remark) = nonblank(content) {
                    self.append_section(session, &remark);
                }
                self.finalize(session);
                return Applied::Done;
            }
            StreamEvent::Error { message } => {
                self.commit_thinking(session);
                self.finalize(session);
                return Applied::Fatal(message);
            }
            StreamEvent::Unknown => {
                trace!("Ignoring unrecognized stream event");
            }
        }
        Applied::Continue
    }

    /// End-of-stream cleanup: commit any thinking residue and clear the
    /// streaming flag. Safe to call on every exit path.
    pub fn finish(&mut self, session: &mut Session) {
        self.commit_thinking(session);
        self.finalize(session);
    }

    /// Surface a turn-level failure as a visible assistant message.
    pub fn resolve_error(&mut self, session: &mut Session, text: &str) {
        let message = self.ensure_message(session);
        message.content = text.to_string();
        message.streaming = false;
        self.content_set = true;
        self.finalized = true;
    }

    fn apply_node(
        &mut self,
        session: &mut Session,
        node: &str,
        content: Option<String>,
        tool: Option<String>,
        status: Option<String>,
    ) {
        match node {
            "reasoning" | "tool" | "tool_executor" => {
                session.status = Some(match &tool {
                    Some(tool) => format!("Running {}", tool),
                    None => status.unwrap_or_else(|| "Reasoning about next steps".to_string()),
                });
                if let Some(tool) = tool {
                    let detail = content.clone();
                    let message = self.ensure_message(session);
                    message.tool_calls.push(ToolCallRecord { tool, detail });
                }
                if let Some(step) = nonblank(content) {
                    self.push_thinking_step(session, step);
                }
            }
            "reflection" | "validation" => {
                if let Some(step) = nonblank(content) {
                    self.push_thinking_step(session, step.clone());
                    // Noise filter: only a substantial reflection is an
                    // authoritative content payload.
                    if step.chars().count() > REFLECTION_CONTENT_MIN_CHARS {
                        self.replace_content(session, step);
                    }
                }
            }
            "response" => {
                if let Some(content) = nonblank(content) {
                    self.replace_content(session, content);
                }
            }
            other => {
                trace!("Unhandled node kind: {}", other);
                if let Some(step) = nonblank(content) {
                    self.push_thinking_step(session, step);
                }
            }
        }
    }

    /// Look up the turn's message, creating and appending it on first need.
    /// Lookup is by the captured id; append is the fallback if the message
    /// has disappeared from the session.
    fn ensure_message<'a>(&mut self, session: &'a mut Session) -> &'a mut Message {
        let id = match &self.message_id {
            Some(id) => id.clone(),
            None => {
                let message = Message::streaming_assistant();
                let id = message.id.clone();
                session.messages.push(message);
                self.message_id = Some(id.clone());
                id
            }
        };
        if let Some(pos) = session.messages.iter().position(|m| m.id == id) {
            &mut session.messages[pos]
        } else {
            let mut message = Message::streaming_assistant();
            message.id = id;
            session.messages.push(message);
            let last = session.messages.len() - 1;
            &mut session.messages[last]
        }
    }

    fn append_content(&mut self, session: &mut Session, chunk: &str) {
        let message = self.ensure_message(session);
        message.content.push_str(chunk);
        self.content_set = true;
    }

    fn replace_content(&mut self, session: &mut Session, content: String) {
        let message = self.ensure_message(session);
        message.content = content;
        self.content_set = true;
    }

    /// Append with a blank-line separator (continuation events).
    fn append_section(&mut self, session: &mut Session, content: &str) {
        let message = self.ensure_message(session);
        if !message.content.is_empty() {
            message.content.push_str("\n\n");
        }
        message.content.push_str(content);
        self.content_set = true;
    }

    fn push_thinking_step(&mut self, session: &mut Session, step: String) {
        let message = self.ensure_message(session);
        message.thinking_steps.push(step);
    }

    fn commit_thinking(&mut self, session: &mut Session) {
        if let Some(block) = self.thinking.commit() {
            let message = self.ensure_message(session);
            message.thinking_steps.push(block);
        }
    }

    fn finalize(&mut self, session: &mut Session) {
        if let Some(id) = self.message_id.clone() {
            if let Some(message) = session.message_mut(&id) {
                message.streaming = false;
            }
        }
        self.finalized = true;
    }
}

fn nonblank(content: Option<String>) -> Option<String> {
    let content = content?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
