use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;

use crate::error::into_axum_response;

pub(crate) mod flow;
pub(crate) mod parse;

use self::flow::handler_inner;
use crate::state::AppState;

pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    match handler_inner(state, headers, body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "chat completion request failed");
            into_axum_response(&err)
        }
    }
}
