use schema::SessionDocument;

pub const JSON_MEDIA_TYPE: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Content-Type must be 'application/json'")]
    UnsupportedMediaType { content_type: Option<String> },
    #[error("Request body is not valid: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parses a session upload. The media type must match exactly; parameters
/// such as `; charset=utf-8` are not accepted.
pub fn decode_session(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<SessionDocument, DecodeError> {
    if content_type != Some(JSON_MEDIA_TYPE) {
        return Err(DecodeError::UnsupportedMediaType {
            content_type: content_type.map(str::to_string),
        });
    }

    Ok(serde_json::from_slice(body)?)
}
