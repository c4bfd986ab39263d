//! Durable storage for ingested sessions.
//!
//! Every backend implements [`SessionStore`], a single create-if-absent write
//! keyed by session ID. A second write for the same ID reports
//! [`StoreError::AlreadyExists`] and leaves the first record untouched.

mod memory;
mod object;

pub use memory::MemorySessionStore;
pub use object::{ObjectSessionStore, StorageConfig, create_object_store};

use async_trait::async_trait;
use schema::Session;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session {session_id} already exists")]
    AlreadyExists { session_id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("encoding session record failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists `session` unless a record with the same ID already exists.
    async fn store(&self, session: &Session) -> Result<(), StoreError>;
}

/// Object key for a stored session.
pub fn session_object_path(session_id: &str) -> String {
    format!("v1/{session_id}.json")
}
