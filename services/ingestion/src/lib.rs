pub mod api;
pub mod clock;
pub mod config;
pub mod decode;
pub mod normalize;
pub mod propagation;
pub mod telemetry;
pub mod transport;
pub mod transport_axum;

use std::{sync::Arc, time::Duration};

use store::{SessionStore, StoreError};
use tracing::field::Empty;
use validation::{ValidationErrors, Validator};

use crate::{
    clock::Clock,
    decode::{DecodeError, decode_session},
    normalize::normalize_session,
};

/// The only method accepted for session uploads.
pub const INGEST_METHOD: &str = "PUT";
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where an ingestion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    AwaitingMethod,
    Decoding,
    Validating,
    Normalizing,
    Storing,
}

impl IngestStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingMethod => "awaiting_method",
            Self::Decoding => "decoding",
            Self::Validating => "validating",
            Self::Normalizing => "normalizing",
            Self::Storing => "storing",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestRequest<'a> {
    pub method: &'a str,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    /// A session with the same ID was stored earlier and was left as is.
    AlreadyExists,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("This endpoint only supports {allowed} requests")]
    MethodNotAllowed {
        method: String,
        allowed: &'static str,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("storing session failed")]
    Store(#[source] StoreError),
    #[error("storing session did not finish within {0:?}")]
    StoreTimeout(Duration),
}

impl IngestError {
    pub fn stage(&self) -> IngestStage {
        match self {
            Self::MethodNotAllowed { .. } => IngestStage::AwaitingMethod,
            Self::Decode(_) => IngestStage::Decoding,
            Self::Validation(_) => IngestStage::Validating,
            Self::Store(_) | Self::StoreTimeout(_) => IngestStage::Storing,
        }
    }
}

/// Runs one upload through decode, validate, normalize and store.
///
/// Cheap to clone; every clone shares the same validator, store and clock.
#[derive(Clone)]
pub struct IngestionService {
    validator: Arc<Validator>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl IngestionService {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            validator: Arc::new(Validator::new()),
            store,
            clock,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    #[tracing::instrument(
        name = "ingest",
        skip_all,
        fields(session_id = Empty, application_id = Empty, application_version = Empty)
    )]
    pub async fn ingest(&self, request: IngestRequest<'_>) -> Result<IngestOutcome, IngestError> {
        if request.method != INGEST_METHOD {
            return Err(IngestError::MethodNotAllowed {
                method: request.method.to_string(),
                allowed: INGEST_METHOD,
            });
        }

        let doc = decode_session(request.content_type, request.body)?;

        let span = tracing::Span::current();
        if let Some(session_id) = &doc.session_id {
            span.record("session_id", session_id.as_str());
        }
        if let Some(application_id) = &doc.application_id {
            span.record("application_id", application_id.as_str());
        }
        if let Some(application_version) = &doc.application_version {
            span.record("application_version", application_version.as_str());
        }

        let doc = self.validator.validate_session(doc)?;
        let session = normalize_session(doc, self.clock.now());

        // Dropping this future (client went away) drops the in-flight write.
        match tokio::time::timeout(self.store_timeout, self.store.store(&session)).await {
            Ok(Ok(())) => {
                tracing::info!("Stored session successfully.");
                Ok(IngestOutcome::Created)
            }
            Ok(Err(StoreError::AlreadyExists { .. })) => {
                tracing::warn!("Session already exists, not storing.");
                Ok(IngestOutcome::AlreadyExists)
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "Storing session failed.");
                Err(IngestError::Store(err))
            }
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Storing session failed."
                );
                Err(IngestError::StoreTimeout(self.store_timeout))
            }
        }
    }
}
