//! Transport-neutral request handling. The axum adapter in
//! [`crate::transport_axum`] converts to and from these types.

mod http;
#[cfg(test)]
mod tests;

pub use http::{HttpRequest, HttpResponse};

use crate::{
    INGEST_METHOD, IngestError, IngestOutcome, IngestRequest, IngestionService,
    api::{ErrorEnvelope, SERVICE_UNAVAILABLE_MESSAGE, UNKNOWN_PATH_MESSAGE},
};

pub const SESSIONS_PATH: &str = "/v1/sessions";
pub const PING_PATH: &str = "/ping";

pub async fn handle_request(service: &IngestionService, request: &HttpRequest) -> HttpResponse {
    let (path, _) = split_target(&request.target);
    match path {
        SESSIONS_PATH => ingest_session(service, request).await,
        PING_PATH => match request.method.as_str() {
            "GET" | "HEAD" => HttpResponse::ok_plain("pong"),
            method => {
                tracing::warn!(%method, path, "Rejected request with unsupported method.");
                HttpResponse::method_not_allowed("GET", "This endpoint only supports GET requests")
            }
        },
        _ => {
            tracing::warn!(method = %request.method, path, "Rejected request for unknown path.");
            HttpResponse::not_found(UNKNOWN_PATH_MESSAGE)
        }
    }
}

async fn ingest_session(service: &IngestionService, request: &HttpRequest) -> HttpResponse {
    let ingest_request = IngestRequest {
        method: &request.method,
        content_type: request.header("content-type"),
        body: &request.body,
    };

    match service.ingest(ingest_request).await {
        Ok(IngestOutcome::Created) => HttpResponse::created(),
        Ok(IngestOutcome::AlreadyExists) => HttpResponse::not_modified(),
        Err(err) => error_response(&err),
    }
}

// Store failures were already logged by the service; client errors are logged here once.
fn error_response(err: &IngestError) -> HttpResponse {
    let stage = err.stage().as_str();
    match err {
        IngestError::MethodNotAllowed { method, .. } => {
            tracing::warn!(%method, stage, "Rejected request with unsupported method.");
            HttpResponse::method_not_allowed(INGEST_METHOD, &err.to_string())
        }
        IngestError::Decode(decode_err) => {
            tracing::warn!(error = %decode_err, stage, "Request body could not be decoded.");
            HttpResponse::bad_request(&ErrorEnvelope::new(decode_err.to_string()))
        }
        IngestError::Validation(errors) => {
            tracing::warn!(
                count = errors.len(),
                errors = %errors.summary(),
                stage,
                "Request body has validation errors."
            );
            HttpResponse::bad_request(&ErrorEnvelope::with_validation_errors(
                errors.to_string(),
                errors.errors().to_vec(),
            ))
        }
        IngestError::Store(_) | IngestError::StoreTimeout(_) => {
            HttpResponse::service_unavailable(SERVICE_UNAVAILABLE_MESSAGE)
        }
    }
}

pub(crate) fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}
