use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use schema::Session;

use crate::{SessionStore, StoreError};

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .read()
            .ok()
            .and_then(|sessions| sessions.get(session_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map_or(0, |sessions| sessions.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn store(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;

        if sessions.contains_key(&session.session_id) {
            return Err(StoreError::AlreadyExists {
                session_id: session.session_id.clone(),
            });
        }

        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}
