use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{chat, health};
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch {
    Health,
    ChatCompletions,
    Preflight,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path());

    let mut response = match route {
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::ChatCompletions => match read_request_body(body).await {
            Ok(body_bytes) => chat::handler(state, parts.headers, body_bytes).await,
            Err(response) => response,
        },
        RouteMatch::Preflight => StatusCode::OK.into_response(),
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    apply_cors_headers(response.headers_mut());
    Ok(response)
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 2MiB)",
            )
                .into_response()
        })
}

fn apply_cors_headers(headers: &mut http::HeaderMap) {
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        http::HeaderValue::from_static("*"),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_METHODS,
        http::HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_HEADERS,
        http::HeaderValue::from_static("Content-Type, Authorization"),
    );
}

fn match_route(method: &Method, path: &str) -> RouteMatch {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    match path {
        "/" | "/health" => {
            if method == Method::GET {
                RouteMatch::Health
            } else if method == Method::OPTIONS {
                RouteMatch::Preflight
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/v1/chat/completions" | "/chat/completions" => {
            if method == Method::POST {
                RouteMatch::ChatCompletions
            } else if method == Method::OPTIONS {
                RouteMatch::Preflight
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => RouteMatch::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_route_chat() {
        assert_eq!(
            match_route(&Method::POST, "/v1/chat/completions"),
            RouteMatch::ChatCompletions
        );
        assert_eq!(
            match_route(&Method::POST, "/chat/completions/"),
            RouteMatch::ChatCompletions
        );
        assert_eq!(
            match_route(&Method::OPTIONS, "/v1/chat/completions"),
            RouteMatch::Preflight
        );
        assert_eq!(
            match_route(&Method::GET, "/v1/chat/completions"),
            RouteMatch::MethodNotAllowed
        );
        assert_eq!(
            match_route(&Method::DELETE, "/v1/chat/completions"),
            RouteMatch::MethodNotAllowed
        );
    }

    #[test]
    fn test_match_route_health_and_unknown() {
        assert_eq!(match_route(&Method::GET, "/"), RouteMatch::Health);
        assert_eq!(match_route(&Method::GET, "/health"), RouteMatch::Health);
        assert_eq!(match_route(&Method::GET, "/v1/models"), RouteMatch::NotFound);
    }
}
