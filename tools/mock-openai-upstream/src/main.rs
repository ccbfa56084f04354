//! Slow, non-streaming stand-in for an OpenAI-compatible upstream.
//!
//! Holds every completion request for `MOCK_DELAY_MS` before answering, so
//! heartbeats and client disconnects can be exercised against a real socket.

use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_001;
const DEFAULT_DELAY_MS: u64 = 5_000;

#[derive(Copy, Clone)]
enum MockScenario {
    Text,
    Long,
    Tools,
    Error,
}

impl MockScenario {
    fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Long => "long",
            Self::Tools => "tools",
            Self::Error => "error",
        }
    }
}

struct RequestStats {
    received: AtomicU64,
    answered: AtomicU64,
}

impl RequestStats {
    const fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            answered: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> (u64, u64) {
        (
            self.received.load(Ordering::Relaxed),
            self.answered.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.answered.store(0, Ordering::Relaxed);
    }
}

struct MockState {
    delay: Duration,
    scenario: MockScenario,
    stats: RequestStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u64("UPSTREAM_PORT", u64::from(DEFAULT_UPSTREAM_PORT));
    let port = u16::try_from(port).unwrap_or(DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        delay: Duration::from_millis(env_u64("MOCK_DELAY_MS", DEFAULT_DELAY_MS)),
        scenario: parse_scenario(),
        stats: RequestStats::new(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!(
        "mock upstream on 127.0.0.1:{port} (scenario={}, delay={}ms)",
        state.scenario.as_str(),
        state.delay.as_millis()
    );

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("long") => MockScenario::Long,
        Ok("tools") => MockScenario::Tools,
        Ok("error") => MockScenario::Error,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    let method = parts.method;
    let path = parts.uri.path();

    if method == Method::GET && path == "/_mock/stats" {
        return stats_response(state);
    }
    if method == Method::POST && path == "/_mock/reset" {
        state.stats.reset();
        return simple_response_static(StatusCode::OK, br#"{"ok":true}"#);
    }
    if method != Method::POST {
        return simple_response_static(
            StatusCode::METHOD_NOT_ALLOWED,
            br#"{"error":"method_not_allowed"}"#,
        );
    }
    if !matches!(path, "/v1/chat/completions" | "/chat/completions") {
        return simple_response_static(StatusCode::NOT_FOUND, br#"{"error":"not_found"}"#);
    }

    state.stats.received.fetch_add(1, Ordering::Relaxed);
    // A client that gives up drops this future here, so `answered` stays behind.
    tokio::time::sleep(state.delay).await;
    state.stats.answered.fetch_add(1, Ordering::Relaxed);

    match state.scenario {
        MockScenario::Text => simple_response_static(StatusCode::OK, COMPLETION_TEXT),
        MockScenario::Long => simple_response(StatusCode::OK, Bytes::from(long_completion())),
        MockScenario::Tools => simple_response_static(StatusCode::OK, COMPLETION_TOOLS),
        MockScenario::Error => simple_response_static(StatusCode::SERVICE_UNAVAILABLE, ERROR_BODY),
    }
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let (received, answered) = state.stats.snapshot();
    let body = format!(
        "{{\"scenario\":\"{}\",\"delay_ms\":{},\"received\":{received},\"answered\":{answered}}}",
        state.scenario.as_str(),
        state.delay.as_millis()
    );
    simple_response(StatusCode::OK, Bytes::from(body.into_bytes()))
}

fn long_completion() -> String {
    let content = "The quick brown fox jumps over the lazy dog. ".repeat(64);
    format!(
        "{{\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion\",\"created\":1,\"model\":\"m1\",\"choices\":[{{\"index\":0,\"message\":{{\"role\":\"assistant\",\"content\":\"{}\"}},\"finish_reason\":\"stop\"}}],\"usage\":{{\"prompt_tokens\":4,\"completion_tokens\":640,\"total_tokens\":644}}}}",
        content.trim_end()
    )
}

fn simple_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn simple_response_static(status: StatusCode, body: &'static [u8]) -> Response<Full<Bytes>> {
    simple_response(status, Bytes::from_static(body))
}

const COMPLETION_TEXT: &[u8] = br#"{"id":"chatcmpl-mock","object":"chat.completion","created":1,"model":"m1","choices":[{"index":0,"message":{"role":"assistant","content":"Hello from the slow mock upstream."},"finish_reason":"stop"}],"usage":{"prompt_tokens":4,"completion_tokens":7,"total_tokens":11}}"#;
const COMPLETION_TOOLS: &[u8] = br#"{"id":"chatcmpl-mock","object":"chat.completion","created":1,"model":"m1","choices":[{"index":0,"message":{"role":"assistant","content":null,"tool_calls":[{"id":"call_mock","type":"function","function":{"name":"get_weather","arguments":"{\"city\":\"Paris\"}"}}]},"finish_reason":"tool_calls"}]}"#;
const ERROR_BODY: &[u8] = br#"{"error":{"message":"mock upstream overloaded","type":"server_error"}}"#;
