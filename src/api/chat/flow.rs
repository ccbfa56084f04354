use std::sync::Arc;

use axum::response::{IntoResponse, Response};

use crate::emulator::EmulationSession;
use crate::error::ProxyError;
use crate::state::AppState;
use crate::stream::FrameSink;

use super::parse::ClassifiedRequest;

#[inline]
pub(crate) fn sse_ok_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    headers.insert(
        http::HeaderName::from_static("x-accel-buffering"),
        http::HeaderValue::from_static("no"),
    );
    response
}

/// Forward the request and replay the upstream reply unchanged, error
/// statuses included.
pub(crate) async fn handle_passthrough(state: &AppState, request: ClassifiedRequest) -> Response {
    match state
        .upstream
        .call(request.upstream_body, &request.credential)
        .await
    {
        Ok(result) => result.into_response(),
        Err(err) => ProxyError::from(err).into_response(),
    }
}

/// Open the client stream and hand the request to an emulation session.
///
/// Returns as soon as the session is spawned so the stream headers go out
/// before the upstream call completes.
pub(crate) fn handle_emulated_stream(
    state: &Arc<AppState>,
    request: ClassifiedRequest,
    request_id: String,
) -> Response {
    let (sink, stream) = FrameSink::channel(state.config.streaming.channel_capacity);
    let session = EmulationSession::new(sink, state.emulation.clone(), request_id, request.model);

    let upstream = state.upstream.clone();
    let ClassifiedRequest {
        upstream_body,
        credential,
        ..
    } = request;
    tokio::spawn(session.run(async move { upstream.call(upstream_body, &credential).await }));

    sse_ok_response(stream.into_body())
}
