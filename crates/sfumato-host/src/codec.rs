//! JSON encoding of requests and responses for text transports.

use sfumato_filter::{FilterError, Request, Response};

/// Decode a JSON request.
///
/// # Errors
///
/// Returns [`FilterError::UnknownRequestType`] when the message is not
/// valid JSON, has no recognised `type` tag, or its fields do not match
/// the tag.
pub fn decode_request(json: &str) -> Result<Request, FilterError> {
    serde_json::from_str(json).map_err(|e| FilterError::UnknownRequestType(e.to_string()))
}

/// Encode a response as JSON.
#[must_use]
pub fn encode_response(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        format!(r#"{{"status":"error","error":{{"ComputationFailed":"serialization error: {e}"}}}}"#)
    })
}
