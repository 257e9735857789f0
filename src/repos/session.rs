//! Sessions and their forward-only state events.

use crate::core::audit::{AuditEvent, AuditOperation, AuditResult};
use crate::core::error::EngineError;
use crate::core::serialize;
use crate::core::store::CorpusStore;
use crate::core::time;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Finalized,
    Archived,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Finalized => "finalized",
            Self::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "open" => Ok(Self::Open),
            "finalized" => Ok(Self::Finalized),
            "archived" => Ok(Self::Archived),
            other => Err(EngineError::Validation(format!(
                "unknown session state '{}'",
                other
            ))),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Finalized => 1,
            Self::Archived => 2,
        }
    }

    /// Transitions only move forward, one step at a time.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        next.rank() == self.rank() + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at: String,
    pub state: SessionState,
    pub metadata: JsonValue,
}

pub struct SessionRepository<'a> {
    store: &'a CorpusStore,
}

impl<'a> SessionRepository<'a> {
    pub fn new(store: &'a CorpusStore) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        user_id: &str,
        metadata: JsonValue,
    ) -> Result<Session, EngineError> {
        let session = Session {
            session_id: time::new_event_id(),
            user_id: user_id.to_string(),
            created_at: time::now_monotonic_ms_z(),
            state: SessionState::Open,
            metadata,
        };
        let event = AuditEvent::new(
            AuditOperation::SESSION_CREATED,
            user_id,
            &format!("session/{}", session.session_id),
            AuditResult::Success,
            &serde_json::json!({"state": "open"}),
        );
        let stored = session.clone();
        self.store.with_append("sessions", event, move |conn| {
            conn.execute(
                "INSERT INTO sessions(session_id, user_id, created_at, metadata) VALUES(?1, ?2, ?3, ?4)",
                params![
                    stored.session_id,
                    stored.user_id,
                    stored.created_at,
                    serialize::encode_attr(&stored.metadata),
                ],
            )?;
            Ok(())
        })?;
        Ok(session)
    }

    /// Read a session, folding its state from the event group. The creation
    /// row never changes; the current state is the latest event, or `open`
    /// when no event exists.
    pub fn read(&self, session_id: &str) -> Result<Session, EngineError> {
        let mut session = self.store.with_read(|conn| {
            conn.query_row(
                "SELECT session_id, user_id, created_at, metadata FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    let raw_meta: String = row.get(3)?;
                    Ok(Session {
                        session_id: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: row.get(2)?,
                        state: SessionState::Open,
                        metadata: serialize::decode_attr(&raw_meta),
                    })
                },
            )
            .map_err(|_| EngineError::NotFound(format!("session '{}'", session_id)))
        })?;
        session.state = self.current_state(session_id)?;
        Ok(session)
    }

    pub fn list(&self, user_id: Option<&str>) -> Result<Vec<Session>, EngineError> {
        let base = self.store.with_read(|conn| {
            let (sql, args): (&str, Vec<String>) = match user_id {
                Some(u) => (
                    "SELECT session_id, user_id, created_at, metadata FROM sessions WHERE user_id = ?1 ORDER BY seq ASC",
                    vec![u.to_string()],
                ),
                None => (
                    "SELECT session_id, user_id, created_at, metadata FROM sessions ORDER BY seq ASC",
                    Vec::new(),
                ),
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                    let raw_meta: String = row.get(3)?;
                    Ok(Session {
                        session_id: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: row.get(2)?,
                        state: SessionState::Open,
                        metadata: serialize::decode_attr(&raw_meta),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        let mut out = Vec::with_capacity(base.len());
        for mut session in base {
            session.state = self.current_state(&session.session_id)?;
            out.push(session);
        }
        Ok(out)
    }

    pub fn current_state(&self, session_id: &str) -> Result<SessionState, EngineError> {
        let raw: Option<String> = self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT state FROM session_events WHERE session_id = ?1 ORDER BY seq DESC LIMIT 1",
            )?;
            let mut rows = stmt.query_map(params![session_id], |row| row.get(0))?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })?;
        match raw {
            Some(s) => SessionState::parse(&s),
            None => Ok(SessionState::Open),
        }
    }

    /// Append a state event. The caller (service layer) has already proven
    /// the transition legal.
    pub fn append_state_event(
        &self,
        user_id: &str,
        session_id: &str,
        next: SessionState,
    ) -> Result<(), EngineError> {
        let op = match next {
            SessionState::Finalized => AuditOperation::SESSION_FINALIZED,
            SessionState::Archived => AuditOperation::SESSION_ARCHIVED,
            SessionState::Open => {
                return Err(EngineError::InvalidTransition(
                    "sessions begin open; no event returns them there".to_string(),
                ));
            }
        };
        let event = AuditEvent::new(
            op,
            user_id,
            &format!("session/{}", session_id),
            AuditResult::Success,
            &serde_json::json!({"state": next.as_str()}),
        );
        let sid = session_id.to_string();
        self.store.with_append("session_events", event, move |conn| {
            conn.execute(
                "INSERT INTO session_events(event_id, session_id, state, ts) VALUES(?1, ?2, ?3, ?4)",
                params![
                    time::new_event_id(),
                    sid,
                    next.as_str(),
                    time::now_monotonic_ms_z(),
                ],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transition_rules() {
        use SessionState::*;
        assert!(Open.can_transition_to(Finalized));
        assert!(Finalized.can_transition_to(Archived));
        assert!(!Open.can_transition_to(Archived));
        assert!(!Finalized.can_transition_to(Open));
        assert!(!Archived.can_transition_to(Finalized));
        assert!(!Archived.can_transition_to(Open));
    }

    #[test]
    fn test_state_parse_rejects_unknown() {
        assert!(SessionState::parse("open").is_ok());
        assert!(SessionState::parse("paused").is_err());
    }
}
