use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;

use crate::state::AppState;

/// Landing page confirming the gateway is up.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let bot_type = state.upstream.bot_type();
    Html(format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html>\n",
            "<head><title>Dify2OpenAI</title></head>\n",
            "<body>\n",
            "<h1>Dify2OpenAI</h1>\n",
            "<p>Congratulations! Your project has been successfully deployed.</p>\n",
            "<p>Bot type: {}</p>\n",
            "</body>\n",
            "</html>\n",
        ),
        bot_type
    ))
}
