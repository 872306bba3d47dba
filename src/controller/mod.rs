//! Stream Controller
//!
//! Owns one request lifecycle per turn: appends the user message, opens the
//! channel, drives bytes through decoder -> classifier -> reducer, and
//! finalizes or aborts the session. The target session id is captured at
//! turn start and threaded explicitly through every downstream update; the
//! crate has no notion of a "currently selected" session.

use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use log::{debug, warn};

use crate::backend::{ChatBackend, ChatTurnRequest};
use crate::session::store::SessionStore;
use crate::session::types::DEFAULT_SESSION_TITLE;
use crate::stream::event::{classify, Classified};
use crate::stream::frame::FrameDecoder;
use crate::stream::reducer::{Applied, TurnReducer};
use crate::util::errors::{ChatError, ChatResult};

const TURN_START_STATUS: &str = "Starting research...";

/// Local fallback title: first few words of the user text, truncated.
const TITLE_MAX_WORDS: usize = 6;
const TITLE_MAX_CHARS: usize = 50;

pub struct ChatController<B: ChatBackend> {
    store: Arc<SessionStore>,
    backend: B,
    /// A turn is exclusive per session; entries are held for the whole turn.
    active_turns: DashMap<String, ()>,
}

impl<B: ChatBackend> ChatController<B> {
    pub fn new(store: Arc<SessionStore>, backend: B) -> Self {
        Self {
            store,
            backend,
            active_turns: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one user-to-assistant turn against the addressed session.
    pub async fn run_turn(&self, session_id: &str, user_text: &str) -> ChatResult<()> {
        if !self.store.contains(session_id) {
            return Err(ChatError::NotFound(session_id.to_string()));
        }
        match self.active_turns.entry(session_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ChatError::TurnInFlight(session_id.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(());
            }
        }

        let result = self.drive_turn(session_id, user_text).await;

        // Guaranteed cleanup on every exit path.
        if let Err(e) = self.store.set_status(session_id, None) {
            warn!("Failed to clear session status: session_id={}, error={}", session_id, e);
        }
        self.active_turns.remove(session_id);

        result
    }

    async fn drive_turn(&self, session_id: &str, user_text: &str) -> ChatResult<()> {
        self.store.push_user_message(session_id, user_text)?;
        self.store
            .set_status(session_id, Some(TURN_START_STATUS.to_string()))?;

        let request = ChatTurnRequest {
            message: user_text.to_string(),
            session_id: session_id.to_string(),
            client_id: None,
        };

        let mut reducer = TurnReducer::new();

        let mut stream = match self.backend.open_chat(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                let text = e.to_string();
                self.store
                    .update(session_id, |session| reducer.resolve_error(session, &text))?;
                return Err(e);
            }
        };

        let mut decoder = FrameDecoder::new();
        let mut done = false;
        let mut fatal: Option<String> = None;

        // The only suspension point is the next-chunk read; everything a
        // chunk carries is applied synchronously, in arrival order.
        'read: while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    fatal = Some(format!("Stream interrupted: {}", e));
                    break 'read;
                }
            };
            for payload in decoder.feed(&chunk) {
                match self.apply_payload(session_id, &mut reducer, &payload)? {
                    Applied::Continue => {}
                    Applied::Done => {
                        done = true;
                        break 'read;
                    }
                    Applied::Fatal(message) => {
                        fatal = Some(message);
                        break 'read;
                    }
                }
            }
        }

        if !done && fatal.is_none() {
            if let Some(payload) = decoder.finish() {
                match self.apply_payload(session_id, &mut reducer, &payload)? {
                    Applied::Done => done = true,
                    Applied::Fatal(message) => fatal = Some(message),
                    Applied::Continue => {}
                }
            }
        }

        // The stream is over either way: commit thinking residue and make
        // sure nothing is left permanently streaming.
        self.store
            .update(session_id, |session| reducer.finish(session))?;

        if let Some(message) = fatal {
            self.store
                .update(session_id, |session| reducer.resolve_error(session, &message))?;
            return Err(ChatError::Stream(message));
        }

        if !reducer.content_set() {
            let error = ChatError::EmptyResponse;
            let text = error.to_string();
            self.store
                .update(session_id, |session| reducer.resolve_error(session, &text))?;
            return Err(error);
        }

        debug!(
            "Turn finished: session_id={}, terminal_event={}",
            session_id, done
        );
        self.apply_title(session_id, user_text).await;
        Ok(())
    }

    /// Classification and reduction are synchronous with respect to one
    /// frame; malformed payloads are logged by the classifier and skipped.
    fn apply_payload(
        &self,
        session_id: &str,
        reducer: &mut TurnReducer,
        payload: &str,
    ) -> ChatResult<Applied> {
        match classify(payload) {
            Classified::Malformed => Ok(Applied::Continue),
            Classified::Event(event) => self
                .store
                .update(session_id, |session| reducer.apply(session, event)),
        }
    }

    /// Title side effect after a successful turn: backend first, local
    /// deterministic fallback on any failure. Never surfaces an error.
    async fn apply_title(&self, session_id: &str, user_text: &str) {
        let needs_title = self
            .store
            .get(session_id)
            .map(|s| s.title.is_empty() || s.title == DEFAULT_SESSION_TITLE)
            .unwrap_or(false);
        if !needs_title {
            return;
        }

        let title = match self.backend.generate_title(user_text).await {
            Ok(title) if !title.trim().is_empty() => title,
            Ok(_) => fallback_title(user_text),
            Err(e) => {
                debug!("Title generation failed, using local fallback: {}", e);
                fallback_title(user_text)
            }
        };

        if let Err(e) = self.store.rename(session_id, &title) {
            warn!("Failed to apply session title: session_id={}, error={}", session_id, e);
        }
    }
}

/// First few words of the user text, truncated.
pub fn fallback_title(user_text: &str) -> String {
    let joined = user_text
        .split_whitespace()
        .take(TITLE_MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        return DEFAULT_SESSION_TITLE.to_string();
    }
    if joined.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = joined.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", truncated.trim_end())
    } else {
        joined
    }
}
