//! Session lifecycle service.
//!
//! Sessions move `open -> finalized -> archived`, forward only. Records may
//! still be appended *referencing* a finalized or archived session; only
//! the session's own state is terminal.

use crate::core::error::EngineError;
use crate::core::policy::PolicyDocument;
use crate::core::store::CorpusStore;
use crate::repos::session::{Session, SessionRepository, SessionState};
use serde_json::Value as JsonValue;

pub struct SessionService<'a> {
    store: &'a CorpusStore,
    policy: PolicyDocument,
}

impl<'a> SessionService<'a> {
    pub fn new(store: &'a CorpusStore, policy: PolicyDocument) -> Self {
        Self { store, policy }
    }

    pub fn create(&self, user_id: &str, metadata: JsonValue) -> Result<Session, EngineError> {
        if user_id.trim().is_empty() {
            return Err(EngineError::Validation("user_id required".to_string()));
        }
        match &metadata {
            JsonValue::Object(_) | JsonValue::Null => {}
            _ => {
                return Err(EngineError::Validation(
                    "session metadata must be a mapping".to_string(),
                ));
            }
        }
        self.policy.check_write("create_session")?;
        let metadata = if metadata.is_null() {
            JsonValue::Object(Default::default())
        } else {
            metadata
        };
        SessionRepository::new(self.store).create(user_id, metadata)
    }

    pub fn get(&self, session_id: &str) -> Result<Session, EngineError> {
        SessionRepository::new(self.store).read(session_id)
    }

    pub fn list(&self, user_id: Option<&str>) -> Result<Vec<Session>, EngineError> {
        SessionRepository::new(self.store).list(user_id)
    }

    pub fn finalize(&self, user_id: &str, session_id: &str) -> Result<Session, EngineError> {
        self.transition(user_id, session_id, SessionState::Finalized)
    }

    pub fn archive(&self, user_id: &str, session_id: &str) -> Result<Session, EngineError> {
        self.transition(user_id, session_id, SessionState::Archived)
    }

    fn transition(
        &self,
        user_id: &str,
        session_id: &str,
        next: SessionState,
    ) -> Result<Session, EngineError> {
        self.policy.check_write("transition_session")?;
        let repo = SessionRepository::new(self.store);
        let session = repo.read(session_id)?;
        let current = session.state;
        if !current.can_transition_to(next) {
            return Err(EngineError::InvalidTransition(format!(
                "session '{}': {} -> {}",
                session_id,
                current.as_str(),
                next.as_str()
            )));
        }
        repo.append_state_event(user_id, session_id, next)?;
        Ok(Session {
            state: next,
            ..session
        })
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "session",
        "version": "0.1.0",
        "description": "Session lifecycle: open -> finalized -> archived, forward only",
        "operations": [
            { "name": "create", "parameters": ["user_id", "metadata"] },
            { "name": "get", "parameters": ["session_id"] },
            { "name": "list", "parameters": ["user_id?"] },
            { "name": "finalize", "parameters": ["session_id"] },
            { "name": "archive", "parameters": ["session_id"] }
        ],
        "storage": ["sessions", "session_events"]
    })
}
