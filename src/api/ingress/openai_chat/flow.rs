use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use axum::response::Response;

use crate::api::common::{
    handle_buffered_request, handle_streaming_request, open_upstream_body, UpstreamIoRequest,
};
use crate::auth::extract_bearer_token;
use crate::error::BridgeError;
use crate::protocol::dify::request::{build_upstream_request, shape_query};
use crate::state::AppState;
use crate::stream::{EventDecoder, StreamSynthesizer};

use super::parse::parse_openai_chat_request_wire;

pub(super) async fn handler_inner(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Result<Response, BridgeError> {
    let start = Instant::now();
    let token = extract_bearer_token(&headers)?;
    let request = parse_openai_chat_request_wire(&body)?;
    let stream_requested = request.wants_stream();

    let query = shape_query(state.upstream.bot_type(), &request.messages)?;
    let upstream_request = build_upstream_request(&state.config.upstream, query);

    let request_id = state
        .request_uuid(state.next_request_seq())
        .hyphenated()
        .to_string();
    tracing::info!(
        request_id = %request_id,
        model = %request.model,
        stream = stream_requested,
        bot_type = %state.upstream.bot_type(),
        messages = request.messages.len(),
        "chat completion request"
    );

    let ctx = UpstreamIoRequest {
        state: state.as_ref(),
        request_id: &request_id,
        client_model: &request.model,
        start,
    };
    let upstream_body = open_upstream_body(ctx, token, &upstream_request).await?;
    let decoder = EventDecoder::new(state.event_classifier());

    if stream_requested {
        let synthesizer = StreamSynthesizer::new(
            request.model.clone(),
            state.ids(),
            state.config.compat.default_usage,
            request.wants_stream_usage(),
        );
        Ok(handle_streaming_request(ctx, upstream_body, decoder, synthesizer).await)
    } else {
        handle_buffered_request(ctx, upstream_body, decoder).await
    }
}
