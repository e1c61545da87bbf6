use std::pin::Pin;
use std::time::Instant;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::error::BridgeError;
use crate::protocol::dify::DifyRequest;
use crate::state::AppState;
use crate::stream::UpstreamLease;

/// Upstream body, owned by whichever response is consuming it.
pub(crate) type LeasedBody =
    Pin<Box<UpstreamLease<BoxStream<'static, Result<Bytes, reqwest::Error>>>>>;

/// Per-request context shared by the streaming and buffered paths.
#[derive(Clone, Copy)]
pub(crate) struct UpstreamIoRequest<'a> {
    pub(crate) state: &'a AppState,
    pub(crate) request_id: &'a str,
    pub(crate) client_model: &'a str,
    pub(crate) start: Instant,
}

/// Send the shaped request upstream and return its still-unread body.
///
/// # Errors
///
/// Propagates serialization, auth-header and transport failures as
/// [`BridgeError`]s; no response bytes have been sent downstream yet.
pub(crate) async fn open_upstream_body(
    ctx: UpstreamIoRequest<'_>,
    token: &str,
    request: &DifyRequest,
) -> Result<LeasedBody, BridgeError> {
    let body = serde_json::to_vec(request)
        .map(Bytes::from)
        .map_err(|err| BridgeError::Internal(format!("Failed to encode upstream request: {err}")))?;
    let headers = ctx.state.upstream.headers_for_token(token)?;

    let response = ctx
        .state
        .transport
        .open_stream(&ctx.state.upstream, headers, body)
        .await?;
    tracing::debug!(
        request_id = ctx.request_id,
        status = response.status().as_u16(),
        "upstream stream opened"
    );

    Ok(Box::pin(UpstreamLease::new(
        response.bytes_stream().boxed(),
        ctx.request_id,
    )))
}
