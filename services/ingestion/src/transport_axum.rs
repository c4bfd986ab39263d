use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{
        HeaderName, HeaderValue, Response, StatusCode,
        header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE, REFERER, USER_AGENT},
    },
    middleware::{self, Next},
    routing::any,
};
use http_body_util::LengthLimitError;
use opentelemetry::propagation::TextMapCompositePropagator;
use tokio::signal;
use tracing::{
    Instrument,
    field::{Empty, display},
};

use crate::{
    IngestionService,
    api::{BODY_TOO_LARGE_MESSAGE, BODY_UNREADABLE_MESSAGE, ErrorEnvelope},
    config::ServiceIdentity,
    propagation::{incoming_propagator, remote_parent},
    transport::{HttpRequest, HttpResponse, handle_request},
};

pub const MAX_HTTP_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("http server failed: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Clone)]
struct AppState {
    service: IngestionService,
}

#[derive(Clone)]
struct RequestLogging {
    identity: ServiceIdentity,
    propagator: Arc<TextMapCompositePropagator>,
}

/// Routes every request through [`handle_request`] behind request logging.
pub fn router(service: IngestionService, identity: ServiceIdentity) -> Router {
    let logging = RequestLogging {
        identity,
        propagator: Arc::new(incoming_propagator()),
    };

    Router::new()
        .fallback(any(dispatch))
        .with_state(AppState { service })
        .layer(middleware::from_fn_with_state(logging, log_request))
}

pub fn serve_http_with_axum(
    service: IngestionService,
    identity: ServiceIdentity,
    bind_addr: &str,
    worker_threads: usize,
) -> Result<(), TransportError> {
    let worker_threads = worker_threads.max(1);
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(TransportError::Runtime)?;

    let bind_addr = bind_addr.to_string();
    tokio_runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;

        tracing::info!(
            bind = %bind_addr,
            worker_threads,
            service = %identity.service,
            revision = %identity.revision,
            "ingestion listening"
        );

        let app = router(service, identity).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(TransportError::Serve)
    })
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response<Body> {
    let method = request.method().to_string();
    let target = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut headers = HashMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let body = match to_bytes(request.into_body(), MAX_HTTP_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(err) => return response_from_transport(body_error_response(err)),
    };

    let request = HttpRequest {
        method,
        target,
        headers,
        body,
    };

    let response = handle_request(&state.service, &request).await;
    response_from_transport(response)
}

fn body_error_response(err: axum::Error) -> HttpResponse {
    let source = err.into_inner();
    if source.is::<LengthLimitError>() {
        tracing::warn!(limit = MAX_HTTP_BODY_BYTES, "Request body exceeds the size limit.");
        HttpResponse::payload_too_large(BODY_TOO_LARGE_MESSAGE)
    } else {
        tracing::warn!(error = %source, "Request body could not be read.");
        HttpResponse::bad_request(&ErrorEnvelope::new(BODY_UNREADABLE_MESSAGE))
    }
}

fn response_from_transport(response: HttpResponse) -> Response<Body> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = status;
    if let Some(content_type) = response.content_type {
        out.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    if let Some(allow) = response.allow {
        out.headers_mut().insert(ALLOW, HeaderValue::from_static(allow));
    }
    out
}

async fn log_request(
    State(logging): State<RequestLogging>,
    request: Request,
    next: Next,
) -> Response<Body> {
    let span = {
        let headers = request.headers();
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let span = tracing::info_span!(
            "request",
            service = %logging.identity.service,
            revision = %logging.identity.revision,
            method = %request.method(),
            uri = %request.uri(),
            user_agent = %header(USER_AGENT),
            referrer = %header(REFERER),
            protocol = ?request.version(),
            remote_ip = Empty,
            request_size = Empty,
            trace_id = Empty,
            parent_span_id = Empty,
            status = Empty,
        );

        if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
            span.record("remote_ip", display(addr.ip()));
        }
        if let Ok(size) = header(CONTENT_LENGTH).parse::<u64>() {
            span.record("request_size", size);
        }
        if let Some(parent) = remote_parent(logging.propagator.as_ref(), headers) {
            span.record("trace_id", display(parent.trace_id()));
            span.record("parent_span_id", display(parent.span_id()));
        }
        span
    };

    async move {
        tracing::info!("Processing request.");
        let response = next.run(request).await;
        tracing::Span::current().record("status", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use store::MemorySessionStore;
    use tower::ServiceExt;

    use super::*;
    use crate::clock::SystemClock;

    fn sample_service() -> IngestionService {
        IngestionService::new(Arc::new(MemorySessionStore::new()), Arc::new(SystemClock))
    }

    fn sample_state() -> AppState {
        AppState {
            service: sample_service(),
        }
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), MAX_HTTP_BODY_BYTES)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn dispatch_ping_returns_pong() {
        let request = axum::http::Request::builder().uri("/ping").body(Body::empty()).unwrap();

        let response = dispatch(State(sample_state()), request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "pong");
    }

    #[tokio::test]
    async fn dispatch_lowercases_header_names() {
        let request = axum::http::Request::builder()
            .method("PUT")
            .uri("/v1/sessions")
            .header("Content-Type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = dispatch(State(sample_state()), request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("validationErrors"));
    }

    #[tokio::test]
    async fn dispatch_rejects_oversized_body_with_json_envelope() {
        let request = axum::http::Request::builder()
            .method("PUT")
            .uri("/v1/sessions")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(vec![b' '; MAX_HTTP_BODY_BYTES + 1]))
            .unwrap();

        let response = dispatch(State(sample_state()), request).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            body_text(response).await,
            r#"{"message":"Request body is too large"}"#
        );
    }

    #[test]
    fn response_from_transport_sets_allow_and_content_type() {
        let response = response_from_transport(HttpResponse::method_not_allowed(
            "PUT",
            "This endpoint only supports PUT requests",
        ));

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "PUT");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn empty_responses_carry_no_content_type() {
        let response = response_from_transport(HttpResponse::created());
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn request_span_carries_caller_trace_and_request_size() {
        let (logs, _guard) = capture_logs();
        let app = router(sample_service(), ServiceIdentity::default());

        let request = axum::http::Request::builder()
            .uri("/ping")
            .header(
                "traceparent",
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            )
            .header(CONTENT_LENGTH, "0")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let logs = logs.text();
        assert!(logs.contains("Processing request."), "{logs}");
        assert!(logs.contains("trace_id=4bf92f3577b34da6a3ce929d0e0e4736"), "{logs}");
        assert!(logs.contains("parent_span_id=00f067aa0ba902b7"), "{logs}");
        assert!(logs.contains("request_size=0"), "{logs}");
    }

    #[tokio::test]
    async fn cloud_trace_header_reaches_the_request_span() {
        let (logs, _guard) = capture_logs();
        let app = router(sample_service(), ServiceIdentity::default());

        let request = axum::http::Request::builder()
            .uri("/ping")
            .header(
                "X-Cloud-Trace-Context",
                "105445aa7843bc8bf206b12000100000/123;o=1",
            )
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap();

        let logs = logs.text();
        assert!(logs.contains("trace_id=105445aa7843bc8bf206b12000100000"), "{logs}");
        assert!(logs.contains("parent_span_id=000000000000007b"), "{logs}");
    }

    #[tokio::test]
    async fn requests_without_trace_headers_have_no_trace_id() {
        let (logs, _guard) = capture_logs();
        let app = router(sample_service(), ServiceIdentity::default());

        let request = axum::http::Request::builder().uri("/ping").body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap();

        let logs = logs.text();
        assert!(logs.contains("Processing request."), "{logs}");
        assert!(!logs.contains("trace_id="), "{logs}");
    }

    #[tokio::test]
    async fn unknown_path_and_ping_method_are_logged_once() {
        let (logs, _guard) = capture_logs();
        let app = router(sample_service(), ServiceIdentity::default());

        let unknown = axum::http::Request::builder().uri("/v2/sessions").body(Body::empty()).unwrap();
        assert_eq!(
            app.clone().oneshot(unknown).await.unwrap().status(),
            StatusCode::NOT_FOUND
        );
        let delete_ping = axum::http::Request::builder()
            .method("DELETE")
            .uri("/ping")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            app.oneshot(delete_ping).await.unwrap().status(),
            StatusCode::METHOD_NOT_ALLOWED
        );

        let logs = logs.text();
        assert_eq!(logs.matches("Rejected request for unknown path.").count(), 1, "{logs}");
        assert_eq!(
            logs.matches("Rejected request with unsupported method.").count(),
            1,
            "{logs}"
        );
    }
}
