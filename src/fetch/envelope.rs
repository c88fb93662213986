//! Response envelope `{ code?, result?, payload }` used by the web endpoint.

use serde::Deserialize;
use serde_json::Value;

use super::FetchError;

const SUCCESS_CODE: &str = "OPERATION-OK";
const SUCCESS_RESULT: &str = "OK";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// Validate an envelope and extract its payload.
///
/// `code` and `result` are optional, but when present they must carry the
/// success value (compared case-insensitively). A missing or null payload is
/// always a rejection.
pub fn unwrap_envelope(body: Value) -> Result<Value, FetchError> {
    let envelope: Envelope = serde_json::from_value(body)
        .map_err(|e| FetchError::Envelope(format!("not an envelope: {}", e)))?;

    if let Some(code) = &envelope.code {
        if !code.eq_ignore_ascii_case(SUCCESS_CODE) {
            return Err(FetchError::Envelope(format!("code {}", code)));
        }
    }

    if let Some(result) = &envelope.result {
        if !result.eq_ignore_ascii_case(SUCCESS_RESULT) {
            return Err(FetchError::Envelope(format!("result {}", result)));
        }
    }

    match envelope.payload {
        Some(Value::Null) | None => Err(FetchError::Envelope("missing payload".to_string())),
        Some(payload) => Ok(payload),
    }
}
