//! Per-session conversation transcripts.
//!
//! Each session keeps an append-only ordered list of turns plus an
//! optional preferred-model override. Mutations of a session (append on
//! request, append on response, reset on clear) happen under that
//! session's own lock, so concurrent requests on the same session can
//! never interleave or lose turns. Sessions are independent; nothing is
//! shared across them and nothing survives the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{ChatTurn, Role};

#[derive(Debug, Default)]
struct SessionState {
    turns: Vec<ChatTurn>,
    preferred_model: Option<String>,
}

/// In-memory store of session transcripts, keyed by an opaque identifier
/// supplied by the transport boundary.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionState>>>>,
    history_limit: usize,
}

impl SessionStore {
    /// `history_limit` is the number of transcript turns (including the
    /// newest user turn) sent as model context.
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Append the user's message and return the context to send upstream:
    /// the most recent `history_limit` turns, ending with the new user
    /// turn. The system instruction is prepended by the provider layer.
    pub fn append_and_build_context(&self, session_id: &str, user_text: &str) -> Vec<ChatTurn> {
        let session = self.session(session_id);
        let mut state = session.lock().expect("session lock poisoned");
        state.turns.push(ChatTurn::new(Role::User, user_text));
        let start = state.turns.len().saturating_sub(self.history_limit);
        state.turns[start..].to_vec()
    }

    /// Append the assistant's reply to the transcript.
    pub fn append_assistant(&self, session_id: &str, text: &str) -> ChatTurn {
        let session = self.session(session_id);
        let mut state = session.lock().expect("session lock poisoned");
        let turn = ChatTurn::new(Role::Assistant, text);
        state.turns.push(turn.clone());
        turn
    }

    /// Reset the session transcript to empty. The preferred model, being a
    /// setting rather than conversation state, survives the clear.
    pub fn clear(&self, session_id: &str) {
        let session = self.session(session_id);
        let mut state = session.lock().expect("session lock poisoned");
        state.turns.clear();
    }

    pub fn preferred_model(&self, session_id: &str) -> Option<String> {
        let session = self.session(session_id);
        let state = session.lock().expect("session lock poisoned");
        state.preferred_model.clone()
    }

    /// `None` restores the configured default.
    pub fn set_preferred_model(&self, session_id: &str, model: Option<String>) {
        let session = self.session(session_id);
        let mut state = session.lock().expect("session lock poisoned");
        state.preferred_model = model;
    }

    pub fn turn_count(&self, session_id: &str) -> usize {
        let session = self.session(session_id);
        let state = session.lock().expect("session lock poisoned");
        state.turns.len()
    }
}
