use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};
use schema::Session;

use crate::{SessionStore, StoreError, session_object_path};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageConfig {
    #[default]
    Memory,
    Local {
        path: PathBuf,
    },
}

pub fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(InMemory::new())),
        StorageConfig::Local { path } => {
            std::fs::create_dir_all(path).map_err(|err| {
                StoreError::Unavailable(format!("creating {}: {err}", path.display()))
            })?;
            let store = LocalFileSystem::new_with_prefix(path)
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Writes each session as one JSON object under `v1/`.
#[derive(Debug, Clone)]
pub struct ObjectSessionStore {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectSessionStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let path = Path::from(session_object_path(session_id));
        let bytes = match self.inner.get(&path).await {
            Ok(result) => result.bytes().await.map_err(unavailable)?,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(unavailable(err)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait]
impl SessionStore for ObjectSessionStore {
    #[tracing::instrument(skip_all, fields(session_id = %session.session_id))]
    async fn store(&self, session: &Session) -> Result<(), StoreError> {
        let path = Path::from(session_object_path(&session.session_id));
        let body = serde_json::to_vec(session)?;

        // Create mode makes the backend enforce "write only if absent".
        let options = PutOptions::from(PutMode::Create);
        match self
            .inner
            .put_opts(&path, PutPayload::from(body), options)
            .await
        {
            Ok(_) => {
                tracing::debug!(%path, "session object written");
                Ok(())
            }
            Err(object_store::Error::AlreadyExists { .. }) => Err(StoreError::AlreadyExists {
                session_id: session.session_id.clone(),
            }),
            Err(err) => Err(unavailable(err)),
        }
    }
}

fn unavailable(err: object_store::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}
