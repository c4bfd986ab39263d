use serde::Serialize;
use validation::ValidationError;

pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Could not process request";
pub const UNKNOWN_PATH_MESSAGE: &str = "unknown path";
pub const BODY_TOO_LARGE_MESSAGE: &str = "Request body is too large";
pub const BODY_UNREADABLE_MESSAGE: &str = "Request body could not be read";

/// JSON body returned with every failed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<ValidationError>>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            validation_errors: None,
        }
    }

    pub fn with_validation_errors(
        message: impl Into<String>,
        validation_errors: Vec<ValidationError>,
    ) -> Self {
        Self {
            message: message.into(),
            validation_errors: Some(validation_errors),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            serde_json::json!({ "message": self.message }).to_string()
        })
    }
}
