use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

pub(crate) mod flow;
pub mod parse;

use self::flow::{handle_emulated_stream, handle_passthrough};
use self::parse::classify_request;
use crate::state::AppState;

/// `POST /v1/chat/completions`.
///
/// Streaming requests are emulated over a non-streaming upstream call;
/// everything else is forwarded as-is.
pub async fn handler(state: Arc<AppState>, headers: HeaderMap, body: bytes::Bytes) -> Response {
    let request = match classify_request(&body, &headers, &state.config.upstream) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "rejected chat completion request");
            return err.into_response();
        }
    };

    let request_id = state.next_completion_id();
    tracing::info!(
        request_id = %request_id,
        model = %request.model,
        stream = request.wants_stream,
        "chat completion request accepted"
    );

    if request.wants_stream {
        handle_emulated_stream(&state, request, request_id)
    } else {
        handle_passthrough(&state, request).await
    }
}
