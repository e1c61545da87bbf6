use crate::protocol::error_shapes::{error_payload, unauthorized_payload};

/// Error type shared by the request path, the transport and the stream adapter.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream responded with {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("Request timed out")]
    Timeout,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Timeout,
    ServerError,
}

impl BridgeError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            BridgeError::Auth(_) => ErrorCategory::Authentication,
            BridgeError::Timeout => ErrorCategory::Timeout,
            // Upstream 4xx/5xx are never relayed verbatim: the gateway itself failed.
            BridgeError::Config(_)
            | BridgeError::Upstream { .. }
            | BridgeError::Transport(_)
            | BridgeError::Internal(_) => ErrorCategory::ServerError,
        }
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Timeout => http::StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Downstream error body
// ---------------------------------------------------------------------------

/// Format an error for the downstream caller, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &BridgeError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);

    let body = match err {
        BridgeError::Auth(_) => unauthorized_payload(status),
        BridgeError::Upstream { status, .. } => {
            error_payload(&format!("Upstream responded with {status}"))
        }
        other => error_payload(&other.to_string()),
    };

    (status, body)
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

/// Convert a `BridgeError` into an axum response.
#[must_use]
pub fn into_axum_response(err: &BridgeError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_uses_errmsg_shape() {
        let (status, body) = format_error(&BridgeError::Auth("Missing API key".into()));
        assert_eq!(status, http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);
        assert_eq!(body["errmsg"], "Unauthorized.");
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let (status, body) = format_error(&BridgeError::Timeout);
        assert_eq!(status, http::StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "Request timed out");
    }

    #[test]
    fn test_upstream_status_is_not_relayed() {
        let err = BridgeError::Upstream {
            status: 404,
            message: "app not found".into(),
        };
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Upstream responded with 404");
    }

    #[test]
    fn test_gateway_failures_map_to_500() {
        for err in [
            BridgeError::Config("bad url".into()),
            BridgeError::Transport("connection refused".into()),
            BridgeError::Internal("encode".into()),
        ] {
            assert_eq!(err.category(), ErrorCategory::ServerError);
            let (status, body) = format_error(&err);
            assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["error"], err.to_string());
        }
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        let (status, body) = format_error(&BridgeError::InvalidRequest("messages is empty".into()));
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request: messages is empty");
    }
}
