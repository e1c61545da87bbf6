/// Message carried by every 401 response.
pub(crate) const UNAUTHORIZED_MESSAGE: &str = "Unauthorized.";
/// Buffered-mode error document when the upstream reported an `error` event.
pub(crate) const PROCESSING_ERROR_MESSAGE: &str =
    "An error occurred while processing the request.";
/// Buffered-mode error document when the upstream closed without a terminal event.
pub(crate) const UNEXPECTED_END_MESSAGE: &str = "Unexpected end of stream.";

#[must_use]
pub(crate) fn unauthorized_payload(status: http::StatusCode) -> serde_json::Value {
    serde_json::json!({
        "code": status.as_u16(),
        "errmsg": UNAUTHORIZED_MESSAGE,
    })
}

#[must_use]
pub(crate) fn error_payload(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}
