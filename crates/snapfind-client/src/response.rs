//! Status and body handling shared by the guest and staff clients.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use snapfind_core::ApiError;

const MAX_MESSAGE_LEN: usize = 200;

/// How a `404` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NotFound {
    /// The event is gone; permanent.
    EventExpired,
    /// An ordinary server error.
    ServerError,
}

pub(crate) fn network(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Network(format!("request timed out: {e}"))
    } else {
        ApiError::Network(e.to_string())
    }
}

/// Send a request and map non-success statuses.
pub(crate) async fn send(request: RequestBuilder, not_found: NotFound) -> Result<Response, ApiError> {
    let resp = request.send().await.map_err(network)?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND && not_found == NotFound::EventExpired {
        return Err(ApiError::EventExpired);
    }

    let body = resp.text().await.unwrap_or_default();
    tracing::debug!(status = status.as_u16(), body_len = body.len(), "request rejected");
    Err(ApiError::Server {
        status: status.as_u16(),
        message: server_message(&body),
    })
}

pub(crate) async fn body_bytes(resp: Response) -> Result<Vec<u8>, ApiError> {
    Ok(resp.bytes().await.map_err(network)?.to_vec())
}

pub(crate) async fn body_text(resp: Response) -> Result<String, ApiError> {
    resp.text().await.map_err(network)
}

/// Pull a human-readable message out of an error body.
///
/// JSON bodies contribute their `message`, `error` or `detail` field; HTML
/// error pages contribute nothing; other text is used as-is, truncated.
pub fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Object(fields) => ["message", "error", "detail"]
                .iter()
                .filter_map(|key| fields.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|s| !s.is_empty())
                .map(truncate),
            Value::String(s) if !s.trim().is_empty() => Some(truncate(s.trim())),
            _ => None,
        };
    }

    if trimmed.starts_with('<') {
        return None;
    }
    Some(truncate(trimmed))
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}
