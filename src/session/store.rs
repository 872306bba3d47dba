use dashmap::DashMap;

use crate::session::types::{Message, Role, Session};
use crate::util::errors::{ChatError, ChatResult};

/// Keyed collection of conversation sessions.
///
/// The only mutation path is [`SessionStore::update`]: an O(1) targeted
/// update against one entry, addressed by an explicit session id. Readers
/// get cloned snapshots, never references into the map.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn create(&self, title: impl Into<String>) -> Session {
        let session = Session::new(title);
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub fn insert(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Atomically mutate one session by id.
    pub fn update<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> ChatResult<R> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))?;
        Ok(f(entry.value_mut()))
    }

    pub fn push_user_message(&self, session_id: &str, text: &str) -> ChatResult<Message> {
        let message = Message::new(Role::User, text);
        let cloned = message.clone();
        self.update(session_id, move |session| session.messages.push(message))?;
        Ok(cloned)
    }

    pub fn set_status(&self, session_id: &str, status: Option<String>) -> ChatResult<()> {
        self.update(session_id, |session| session.status = status)
    }

    pub fn rename(&self, session_id: &str, title: &str) -> ChatResult<()> {
        self.update(session_id, |session| session.title = title.to_string())
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Session snapshots, newest first.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> =
            self.sessions.iter().map(|entry| entry.clone()).collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
