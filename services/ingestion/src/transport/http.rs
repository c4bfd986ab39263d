use std::collections::HashMap;

use crate::api::ErrorEnvelope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    /// Header names are stored lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub allow: Option<&'static str>,
    pub body: String,
}

impl HttpResponse {
    fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            allow: None,
            body: String::new(),
        }
    }

    pub fn created() -> Self {
        Self::empty(201)
    }

    pub fn not_modified() -> Self {
        Self::empty(304)
    }

    pub fn ok_plain(body: &str) -> Self {
        Self {
            status: 200,
            content_type: Some("text/plain; charset=utf-8"),
            allow: None,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, envelope: &ErrorEnvelope) -> Self {
        Self {
            status,
            content_type: Some("application/json"),
            allow: None,
            body: envelope.to_json(),
        }
    }

    pub fn bad_request(envelope: &ErrorEnvelope) -> Self {
        Self::error(400, envelope)
    }

    pub fn not_found(message: &str) -> Self {
        Self::error(404, &ErrorEnvelope::new(message))
    }

    pub fn method_not_allowed(allowed: &'static str, message: &str) -> Self {
        Self {
            allow: Some(allowed),
            ..Self::error(405, &ErrorEnvelope::new(message))
        }
    }

    pub fn payload_too_large(message: &str) -> Self {
        Self::error(413, &ErrorEnvelope::new(message))
    }

    pub fn service_unavailable(message: &str) -> Self {
        Self::error(503, &ErrorEnvelope::new(message))
    }
}
