use std::{collections::HashMap, sync::Arc};

use serde_json::{Value, json};
use store::MemorySessionStore;

use super::*;
use crate::clock::FixedClock;

const VALID_BODY: &str = r#"{"sessionId":"11112222-3333-4444-a555-666677778888","userId":"99990000-3333-4444-a555-666677778888","sessionStartTime":"2019-01-02T03:04:05.678Z","sessionEndTime":"2019-01-02T09:04:05.678Z","applicationId":"test-app","applicationVersion":"1.0.0"}"#;

fn sample_service() -> (IngestionService, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    let clock = FixedClock("2020-05-24T10:12:14.000123Z".parse().unwrap());
    (IngestionService::new(store.clone(), Arc::new(clock)), store)
}

fn request(method: &str, target: &str, content_type: Option<&str>, body: &str) -> HttpRequest {
    HttpRequest {
        method: method.to_string(),
        target: target.to_string(),
        headers: content_type
            .map(|value| HashMap::from([("content-type".to_string(), value.to_string())]))
            .unwrap_or_default(),
        body: body.as_bytes().to_vec(),
    }
}

fn put_session(body: &str) -> HttpRequest {
    request("PUT", SESSIONS_PATH, Some("application/json"), body)
}

fn body_json(response: &HttpResponse) -> Value {
    serde_json::from_str(&response.body).unwrap()
}

#[tokio::test]
async fn handle_request_put_creates_session() {
    let (service, store) = sample_service();

    let response = handle_request(&service, &put_session(VALID_BODY)).await;

    assert_eq!(response.status, 201);
    assert!(response.body.is_empty());
    assert_eq!(response.content_type, None);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn handle_request_ignores_query_string() {
    let (service, _) = sample_service();
    let request = request(
        "PUT",
        "/v1/sessions?source=ci",
        Some("application/json"),
        VALID_BODY,
    );

    assert_eq!(handle_request(&service, &request).await.status, 201);
}

#[tokio::test]
async fn handle_request_repeat_put_is_not_modified() {
    let (service, _) = sample_service();

    handle_request(&service, &put_session(VALID_BODY)).await;
    let response = handle_request(&service, &put_session(VALID_BODY)).await;

    assert_eq!(response.status, 304);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn handle_request_rejects_other_methods_with_allow_header() {
    let (service, _) = sample_service();

    for method in ["GET", "POST", "DELETE", "PATCH"] {
        let response =
            handle_request(&service, &request(method, SESSIONS_PATH, None, "")).await;
        assert_eq!(response.status, 405);
        assert_eq!(response.allow, Some("PUT"));
        assert_eq!(
            body_json(&response),
            json!({"message": "This endpoint only supports PUT requests"})
        );
    }
}

#[tokio::test]
async fn handle_request_rejects_wrong_content_type() {
    let (service, _) = sample_service();
    let request = request("PUT", SESSIONS_PATH, Some("text/plain"), VALID_BODY);

    let response = handle_request(&service, &request).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.content_type, Some("application/json"));
    assert_eq!(
        body_json(&response),
        json!({"message": "Content-Type must be 'application/json'"})
    );
}

#[tokio::test]
async fn handle_request_reports_decode_failure_message() {
    let (service, _) = sample_service();

    let response = handle_request(&service, &put_session("")).await;

    assert_eq!(response.status, 400);
    let message = body_json(&response)["message"].as_str().unwrap().to_string();
    assert!(message.starts_with("Request body is not valid: EOF while parsing"));
}

#[tokio::test]
async fn handle_request_lists_validation_errors() {
    let (service, store) = sample_service();

    let response = handle_request(&service, &put_session("{}")).await;

    assert_eq!(response.status, 400);
    let body = body_json(&response);
    assert_eq!(body["message"], "Request body has validation errors");
    assert_eq!(body["validationErrors"].as_array().unwrap().len(), 6);
    assert_eq!(
        body["validationErrors"][0],
        json!({"key": "sessionId", "type": "required", "message": "sessionId is a required field"})
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn handle_request_ping_returns_pong() {
    let (service, _) = sample_service();

    let response = handle_request(&service, &request("GET", PING_PATH, None, "")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "pong");

    let response = handle_request(&service, &request("PUT", PING_PATH, None, "")).await;
    assert_eq!(response.status, 405);
    assert_eq!(response.allow, Some("GET"));
}

#[tokio::test]
async fn handle_request_unknown_path_is_not_found() {
    let (service, _) = sample_service();

    let response = handle_request(&service, &request("PUT", "/v2/sessions", None, "")).await;

    assert_eq!(response.status, 404);
    assert_eq!(body_json(&response), json!({"message": "unknown path"}));
}

#[test]
fn split_target_separates_query() {
    assert_eq!(split_target("/v1/sessions?a=b"), ("/v1/sessions", Some("a=b")));
    assert_eq!(split_target("/ping"), ("/ping", None));
}

#[test]
fn request_header_lookup_is_case_insensitive() {
    let request = request("PUT", SESSIONS_PATH, Some("application/json"), "");
    assert_eq!(request.header("Content-Type"), Some("application/json"));
    assert_eq!(request.header("accept"), None);
}
