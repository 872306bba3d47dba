//! End-to-end pipeline tests: scripted byte streams driven through the
//! controller against an in-memory session store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;

use deepcourse_core::backend::{
    ByteStream, ChatBackend, ChatTurnRequest, SessionDetail, SessionList,
};
use deepcourse_core::{
    classify, Applied, ChatController, ChatError, ChatResult, Classified, FrameDecoder, Role,
    Session, SessionStore, TurnReducer, DEFAULT_SESSION_TITLE,
};

/// Serialize events into wire frames, one `data:` line per frame.
fn wire(events: &[serde_json::Value]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for event in events {
        bytes.extend_from_slice(b"data: ");
        bytes.extend_from_slice(event.to_string().as_bytes());
        bytes.extend_from_slice(b"\n\n");
    }
    bytes
}

enum Script {
    Chunks(Vec<Vec<u8>>),
    TransportFailure,
    Pending,
}

struct ScriptedBackend {
    script: Script,
    title: String,
    title_calls: AtomicUsize,
}

impl ScriptedBackend {
    fn chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            script: Script::Chunks(chunks),
            title: "Generated Title".to_string(),
            title_calls: AtomicUsize::new(0),
        }
    }

    fn events(events: &[serde_json::Value]) -> Self {
        Self::chunks(vec![wire(events)])
    }

    fn transport_failure() -> Self {
        Self {
            script: Script::TransportFailure,
            title: String::new(),
            title_calls: AtomicUsize::new(0),
        }
    }

    fn pending() -> Self {
        Self {
            script: Script::Pending,
            title: String::new(),
            title_calls: AtomicUsize::new(0),
        }
    }

    fn title_calls(&self) -> usize {
        self.title_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_chat(&self, _request: &ChatTurnRequest) -> ChatResult<ByteStream> {
        match &self.script {
            Script::Chunks(chunks) => {
                let chunks = chunks.clone();
                Ok(stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed())
            }
            Script::TransportFailure => {
                Err(ChatError::Transport("connection refused".to_string()))
            }
            Script::Pending => Ok(stream::pending().boxed()),
        }
    }

    async fn generate_title(&self, _message: &str) -> ChatResult<String> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        if self.title.is_empty() {
            Err(ChatError::Transport("title endpoint down".to_string()))
        } else {
            Ok(self.title.clone())
        }
    }

    async fn list_sessions(&self) -> ChatResult<SessionList> {
        Ok(SessionList {
            sessions: vec![],
            total: 0,
        })
    }

    async fn session_detail(&self, session_id: &str) -> ChatResult<SessionDetail> {
        Err(ChatError::NotFound(session_id.to_string()))
    }

    async fn create_session(&self) -> ChatResult<String> {
        Ok("remote-session".to_string())
    }

    async fn rename_session(&self, _session_id: &str, _title: &str) -> ChatResult<()> {
        Ok(())
    }

    async fn delete_session(&self, _session_id: &str) -> ChatResult<()> {
        Ok(())
    }
}

fn controller(backend: ScriptedBackend) -> (ChatController<ScriptedBackend>, String) {
    let store = Arc::new(SessionStore::new());
    let session = store.create(DEFAULT_SESSION_TITLE);
    (ChatController::new(store, backend), session.id)
}

/// Drive the raw pipeline (decoder -> classifier -> reducer) over the given
/// chunking, without the controller.
fn reduce_chunks(chunks: &[&[u8]]) -> Session {
    let mut session = Session::new(DEFAULT_SESSION_TITLE);
    let mut reducer = TurnReducer::new();
    let mut decoder = FrameDecoder::new();
    let mut apply = |session: &mut Session, reducer: &mut TurnReducer, payload: &str| {
        if let Classified::Event(event) = classify(payload) {
            let _ = reducer.apply(session, event);
        }
    };
    for chunk in chunks {
        for payload in decoder.feed(chunk) {
            apply(&mut session, &mut reducer, &payload);
        }
    }
    if let Some(payload) = decoder.finish() {
        apply(&mut session, &mut reducer, &payload);
    }
    reducer.finish(&mut session);
    session
}

#[test]
fn chunk_boundary_invariance() {
    let bytes = wire(&[
        serde_json::json!({"type": "status", "content": "Working"}),
        serde_json::json!({"type": "thinking", "content": "caf\u{e9} "}),
        serde_json::json!({"type": "thinking", "content": "\u{1f3af}"}),
        serde_json::json!({"type": "thinking_start"}),
        serde_json::json!({"type": "text", "content": "R\u{e9}sum\u{e9}: "}),
        serde_json::json!({"type": "text", "content": "ready \u{2713}"}),
        serde_json::json!({"type": "phase_start", "phase": "industry", "number": 2, "total": 3}),
        serde_json::json!({"type": "done"}),
    ]);

    let reference = reduce_chunks(&[&bytes]);
    assert_eq!(reference.messages.len(), 1);

    // Split the byte stream at every position, including inside multi-byte
    // characters and inside frames.
    for split in 1..bytes.len() {
        let session = reduce_chunks(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(session.messages.len(), reference.messages.len(), "split at {}", split);
        let got = &session.messages[0];
        let want = &reference.messages[0];
        assert_eq!(got.content, want.content, "split at {}", split);
        assert_eq!(got.thinking_steps, want.thinking_steps, "split at {}", split);
        assert_eq!(got.streaming, want.streaming, "split at {}", split);
        assert_eq!(session.status, reference.status, "split at {}", split);
        assert_eq!(session.phase, reference.phase, "split at {}", split);
    }
}

#[tokio::test]
async fn clarification_supersedes_text_deltas() {
    let backend = ScriptedBackend::events(&[
        serde_json::json!({"type": "text", "content": "Hello"}),
        serde_json::json!({"type": "clarification_stream", "content": "Please clarify X"}),
        serde_json::json!({"type": "done"}),
    ]);
    let (controller, session_id) = controller(backend);

    controller
        .run_turn(&session_id, "research rust courses")
        .await
        .expect("turn succeeds");

    let session = controller.store().get(&session_id).expect("session exists");
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].role, Role::User);
    let assistant = &session.messages[1];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.content, "Please clarify X");
    assert!(!assistant.streaming);
    assert!(session.status.is_none(), "status cleared after the turn");
    assert_eq!(controller.backend().title_calls(), 1);
    assert_eq!(session.title, "Generated Title");
}

#[tokio::test]
async fn updates_route_to_captured_session_not_selected_one() {
    let store = Arc::new(SessionStore::new());
    let session_a = store.create(DEFAULT_SESSION_TITLE);
    let session_b = store.create(DEFAULT_SESSION_TITLE);
    let backend = ScriptedBackend::events(&[
        serde_json::json!({"type": "text", "content": "answer for A"}),
        serde_json::json!({"type": "done"}),
    ]);
    let controller = ChatController::new(store, backend);

    // The presentation layer "switches" to B; the core never consults any
    // ambient selection, only the id captured at turn start.
    controller
        .run_turn(&session_a.id, "question for A")
        .await
        .expect("turn succeeds");

    let a = controller.store().get(&session_a.id).expect("a exists");
    let b = controller.store().get(&session_b.id).expect("b exists");
    assert_eq!(a.messages.len(), 2);
    assert_eq!(a.messages[1].content, "answer for A");
    assert!(b.messages.is_empty(), "session B must never see the turn");
    assert!(b.status.is_none());
}

#[tokio::test]
async fn empty_stream_is_a_no_response_error() {
    let backend = ScriptedBackend::chunks(vec![]);
    let (controller, session_id) = controller(backend);

    let result = controller.run_turn(&session_id, "hello?").await;
    assert!(matches!(result, Err(ChatError::EmptyResponse)));

    let session = controller.store().get(&session_id).expect("session exists");
    // A visible assistant-role error message, not a permanently-streaming one.
    let assistant = session.messages.last().expect("error message present");
    assert_eq!(assistant.role, Role::Assistant);
    assert!(!assistant.streaming);
    assert!(assistant.content.contains("no response"));
    assert!(session.status.is_none());
    assert_eq!(controller.backend().title_calls(), 0);
}

#[tokio::test]
async fn transport_failure_surfaces_as_turn_error() {
    let backend = ScriptedBackend::transport_failure();
    let (controller, session_id) = controller(backend);

    let result = controller.run_turn(&session_id, "hello").await;
    assert!(matches!(result, Err(ChatError::Transport(_))));

    let session = controller.store().get(&session_id).expect("session exists");
    assert_eq!(session.messages[0].role, Role::User, "user message still appended");
    let assistant = session.messages.last().expect("error message present");
    assert_eq!(assistant.role, Role::Assistant);
    assert!(assistant.content.contains("connection refused"));
    assert!(session.status.is_none());
}

#[tokio::test]
async fn explicit_error_event_aborts_verbatim() {
    let backend = ScriptedBackend::events(&[
        serde_json::json!({"type": "text", "content": "partial"}),
        serde_json::json!({"type": "error", "message": "search quota exhausted"}),
        serde_json::json!({"type": "text", "content": "never applied"}),
    ]);
    let (controller, session_id) = controller(backend);

    let result = controller.run_turn(&session_id, "hello").await;
    match result {
        Err(ChatError::Stream(message)) => assert_eq!(message, "search quota exhausted"),
        other => panic!("expected stream error, got {:?}", other),
    }

    let session = controller.store().get(&session_id).expect("session exists");
    let assistant = session.messages.last().expect("assistant message present");
    assert_eq!(assistant.content, "search quota exhausted");
    assert!(!assistant.streaming);
}

#[tokio::test]
async fn malformed_frames_are_skipped_not_fatal() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"data: {broken json\n\n");
    bytes.extend_from_slice(&wire(&[
        serde_json::json!({"type": "text", "content": "still fine"}),
        serde_json::json!({"type": "done"}),
    ]));
    let backend = ScriptedBackend::chunks(vec![bytes]);
    let (controller, session_id) = controller(backend);

    controller.run_turn(&session_id, "hi").await.expect("turn succeeds");
    let session = controller.store().get(&session_id).expect("session exists");
    assert_eq!(session.messages[1].content, "still fine");
}

#[tokio::test]
async fn duplicate_done_triggers_title_once() {
    let backend = ScriptedBackend::events(&[
        serde_json::json!({"type": "text", "content": "answer"}),
        serde_json::json!({"type": "done"}),
        serde_json::json!({"type": "done"}),
    ]);
    let (controller, session_id) = controller(backend);

    controller.run_turn(&session_id, "hi").await.expect("turn succeeds");
    assert_eq!(controller.backend().title_calls(), 1);
    let session = controller.store().get(&session_id).expect("session exists");
    assert!(!session.messages[1].streaming);
    assert_eq!(session.messages[1].content, "answer");
}

#[tokio::test]
async fn natural_end_with_content_finalizes_without_done() {
    let backend = ScriptedBackend::events(&[serde_json::json!({
        "type": "final_response", "content": "complete report"
    })]);
    let (controller, session_id) = controller(backend);

    controller.run_turn(&session_id, "hi").await.expect("turn succeeds");
    let session = controller.store().get(&session_id).expect("session exists");
    let assistant = &session.messages[1];
    assert_eq!(assistant.content, "complete report");
    assert!(!assistant.streaming);
}

#[tokio::test]
async fn title_failure_falls_back_to_local_title() {
    let mut backend = ScriptedBackend::events(&[
        serde_json::json!({"type": "text", "content": "answer"}),
        serde_json::json!({"type": "done"}),
    ]);
    backend.title = String::new(); // title endpoint fails

    let (controller, session_id) = controller(backend);
    controller
        .run_turn(&session_id, "teach me woodworking basics today")
        .await
        .expect("turn succeeds");

    let session = controller.store().get(&session_id).expect("session exists");
    assert_eq!(session.title, "teach me woodworking basics today");
    assert_eq!(controller.backend().title_calls(), 1);
}

#[tokio::test]
async fn second_turn_for_same_session_is_rejected() {
    let store = Arc::new(SessionStore::new());
    let session = store.create(DEFAULT_SESSION_TITLE);
    let controller = Arc::new(ChatController::new(store, ScriptedBackend::pending()));

    let background = {
        let controller = Arc::clone(&controller);
        let session_id = session.id.clone();
        tokio::spawn(async move { controller.run_turn(&session_id, "first").await })
    };

    // Let the first turn open its (never-ending) stream.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let result = controller.run_turn(&session.id, "second").await;
    assert!(matches!(result, Err(ChatError::TurnInFlight(_))));

    background.abort();
}

#[tokio::test]
async fn unknown_session_is_rejected_before_any_side_effect() {
    let backend = ScriptedBackend::events(&[serde_json::json!({"type": "done"})]);
    let store = Arc::new(SessionStore::new());
    let controller = ChatController::new(store, backend);

    let result = controller.run_turn("missing", "hello").await;
    assert!(matches!(result, Err(ChatError::NotFound(_))));
}

#[test]
fn research_flow_reduces_to_expected_transcript() {
    let bytes = wire(&[
        serde_json::json!({"type": "session", "session_id": "s1"}),
        serde_json::json!({"type": "status", "content": "Planning"}),
        serde_json::json!({"type": "phase_start", "phase": "competitive", "number": 1, "total": 3, "title": "Competitive Research"}),
        serde_json::json!({"type": "search_status", "number": 1}),
        serde_json::json!({"type": "node", "node": "tool_executor", "tool": "web_search", "content": "query: rust courses"}),
        serde_json::json!({"type": "text_stream", "content": "Found "}),
        serde_json::json!({"type": "text_stream", "content": "12 providers."}),
        serde_json::json!({"type": "search_complete", "total": 5}),
        serde_json::json!({"type": "phase_complete", "phase": "competitive", "search_count": 5}),
        serde_json::json!({"type": "research_complete", "report": "# Report\nAll findings.", "topic": "rust"}),
        serde_json::json!({"type": "completion_message", "content": "Want a deeper pass?"}),
        serde_json::json!({"type": "done"}),
    ]);
    let session = reduce_chunks(&[&bytes]);

    assert_eq!(session.messages.len(), 1);
    let assistant = &session.messages[0];
    assert_eq!(assistant.content, "# Report\nAll findings.\n\nWant a deeper pass?");
    assert!(!assistant.streaming);
    assert_eq!(assistant.tool_calls.len(), 1);
    assert_eq!(assistant.tool_calls[0].tool, "web_search");
    let phase = session.phase.expect("phase metadata set");
    assert_eq!(phase.name, "competitive");
    assert_eq!(phase.number, Some(1));
}

#[test]
fn complete_frame_with_closing_remark_keeps_the_remark() {
    let bytes = wire(&[
        serde_json::json!({"type": "text", "content": "Report body"}),
        serde_json::json!({"type": "complete", "content": "Want a deeper pass?"}),
    ]);
    let session = reduce_chunks(&[&bytes]);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].content, "Report body\n\nWant a deeper pass?");
    assert!(!session.messages[0].streaming);
}

#[test]
fn events_after_fatal_error_are_not_applied() {
    // Raw pipeline check mirroring the controller's break-on-fatal behavior.
    let bytes = wire(&[
        serde_json::json!({"type": "text", "content": "partial"}),
        serde_json::json!({"type": "error", "message": "boom"}),
    ]);
    let mut session = Session::new(DEFAULT_SESSION_TITLE);
    let mut reducer = TurnReducer::new();
    let mut decoder = FrameDecoder::new();
    let mut outcome = None;
    for payload in decoder.feed(&bytes) {
        if let Classified::Event(event) = classify(&payload) {
            match reducer.apply(&mut session, event) {
                Applied::Fatal(message) => {
                    outcome = Some(message);
                    break;
                }
                _ => {}
            }
        }
    }
    assert_eq!(outcome.as_deref(), Some("boom"));
    assert!(!session.messages[0].streaming);
}
