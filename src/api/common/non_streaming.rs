use axum::response::Response;
use futures_util::StreamExt;

use crate::error::BridgeError;
use crate::observability::log_request_complete;
use crate::protocol::error_shapes::{
    error_payload, PROCESSING_ERROR_MESSAGE, UNEXPECTED_END_MESSAGE,
};
use crate::protocol::openai_chat::response_encoder::encode_chat_completion;
use crate::stream::{AggregateResult, EventDecoder, ResponseAggregator};

use super::io::{LeasedBody, UpstreamIoRequest};

#[inline]
fn json_response(status: http::StatusCode, body_bytes: Vec<u8>) -> Response {
    let mut response = Response::new(axum::body::Body::from(body_bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

fn error_document(message: &str) -> Result<Response, BridgeError> {
    let body = serde_json::to_vec(&error_payload(message))
        .map_err(|err| BridgeError::Internal(format!("Failed to encode error document: {err}")))?;
    Ok(json_response(http::StatusCode::INTERNAL_SERVER_ERROR, body))
}

/// Drain the upstream into a single `chat.completion` document.
///
/// Reading stops at the first terminal event; the upstream body is dropped
/// before the document is built.
///
/// # Errors
///
/// Returns [`BridgeError::Internal`] only when the document cannot be encoded.
pub(crate) async fn handle_buffered_request(
    ctx: UpstreamIoRequest<'_>,
    mut body: LeasedBody,
    mut decoder: EventDecoder,
) -> Result<Response, BridgeError> {
    let compat = &ctx.state.config.compat;
    let mut aggregator = ResponseAggregator::new(compat.clone());
    let mut outcomes = Vec::with_capacity(8);

    loop {
        match body.next().await {
            Some(Ok(chunk)) => {
                decoder.feed_into(&chunk, &mut outcomes);
            }
            Some(Err(err)) => {
                aggregator.push_transport_error(&err.to_string());
                break;
            }
            None => {
                decoder.finish_into(&mut outcomes);
                for outcome in outcomes.drain(..) {
                    aggregator.push_outcome(outcome);
                }
                break;
            }
        }
        for outcome in outcomes.drain(..) {
            aggregator.push_outcome(outcome);
        }
        if aggregator.is_terminated() {
            break;
        }
    }
    drop(body);

    match aggregator.finish() {
        AggregateResult::Completed { content, usage } => {
            let ids = ctx.state.ids();
            let document = encode_chat_completion(
                ids.completion_id(),
                ids.now_unix_secs(),
                ctx.client_model,
                content,
                usage,
                &compat.system_fingerprint,
            );
            let body = serde_json::to_vec_pretty(&document).map_err(|err| {
                BridgeError::Internal(format!("Failed to encode completion: {err}"))
            })?;
            log_request_complete(ctx.request_id, ctx.client_model, &usage, ctx.start);
            Ok(json_response(http::StatusCode::OK, body))
        }
        AggregateResult::Failed => error_document(PROCESSING_ERROR_MESSAGE),
        AggregateResult::Truncated => error_document(UNEXPECTED_END_MESSAGE),
    }
}
