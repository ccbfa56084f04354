use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use fake_stream_rs::config::{AppConfig, ChunkUnit, StreamingConfig, UpstreamConfig};
use fake_stream_rs::routing::dispatch::dispatch_request;
use fake_stream_rs::state::AppState;
use fake_stream_rs::stream::{SseParser, SseRecord};
use serde_json::{json, Value};

fn build_state(base_url: String, streaming: StreamingConfig) -> Arc<AppState> {
    let config = AppConfig {
        upstream: UpstreamConfig {
            base_url,
            api_key: Some("server-key".to_string()),
            default_model: None,
        },
        streaming,
        ..AppConfig::default()
    };
    Arc::new(AppState::new(config).expect("state"))
}

fn fast_streaming(chunk_size: usize) -> StreamingConfig {
    StreamingConfig {
        chunk_unit: ChunkUnit::Words,
        chunk_size,
        chunk_delay_ms: 0,
        chunk_jitter_ms: 0,
        ..StreamingConfig::default()
    }
}

async fn spawn_upstream(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}

fn stream_request(bearer: Option<&str>) -> Request<Body> {
    let body = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "say hello"}],
        "stream": true,
        "stream_options": {"include_usage": true}
    });
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
        .expect("build request")
}

async fn read_records(response: axum::response::Response) -> Vec<SseRecord> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read stream");
    let text = String::from_utf8(bytes.to_vec()).expect("utf8 stream");
    assert!(text.ends_with("data: [DONE]\n\n"), "stream: {text}");
    SseParser::new().feed(&text)
}

fn data_payloads(records: &[SseRecord]) -> Vec<Value> {
    records
        .iter()
        .filter_map(|record| match record {
            SseRecord::Event(event) if event.data != "[DONE]" => {
                Some(serde_json::from_str(&event.data).expect("chunk json"))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_stream_emulation_of_completed_reply() {
    let seen: Arc<std::sync::Mutex<Option<(Value, String)>>> = Arc::default();
    let seen_in_handler = Arc::clone(&seen);
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let seen = Arc::clone(&seen_in_handler);
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                *seen.lock().unwrap() = Some((body, auth));
                Json(json!({
                    "id": "chatcmpl-upstream",
                    "object": "chat.completion",
                    "created": 1_727_000_000_u64,
                    "model": "gpt-4o-mini-2024",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "hello world foo"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 3, "total_tokens": 6}
                }))
            }
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url, fast_streaming(2));

    let response = dispatch_request(state, stream_request(Some("client-key")))
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");

    let records = read_records(response).await;
    let chunks = data_payloads(&records);
    assert_eq!(chunks.len(), 3);

    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    assert_eq!(chunks[0]["choices"][0]["delta"]["content"], "hello world ");
    assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "foo");
    assert!(chunks[0]["choices"][0]["finish_reason"].is_null());
    assert!(chunks[1]["choices"][0]["finish_reason"].is_null());

    let closing = &chunks[2];
    assert_eq!(closing["choices"][0]["finish_reason"], "stop");
    assert_eq!(closing["choices"][0]["delta"], json!({}));
    assert_eq!(closing["usage"]["total_tokens"], 6);

    for chunk in &chunks {
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["id"], "chatcmpl-upstream");
        assert_eq!(chunk["created"], 1_727_000_000_u64);
        assert_eq!(chunk["model"], "gpt-4o-mini-2024");
    }

    let (upstream_body, auth) = seen.lock().unwrap().clone().expect("upstream called");
    assert_eq!(auth, "Bearer client-key");
    assert_eq!(upstream_body["stream"], false);
    assert!(upstream_body.get("stream_options").is_none());

    server.abort();
}

#[tokio::test]
async fn test_stream_reports_upstream_failure_in_band() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": {"message": "overloaded", "type": "server_error"}})),
            )
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url, fast_streaming(8));

    let response = dispatch_request(state, stream_request(None))
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let records = read_records(response).await;
    let payloads = data_payloads(&records);
    assert_eq!(payloads.len(), 1);
    let error = &payloads[0]["error"];
    assert_eq!(error["message"], "overloaded");
    assert_eq!(error["status"], 503);
    assert!(payloads[0].get("choices").is_none());

    server.abort();
}

#[tokio::test]
async fn test_stream_sends_heartbeats_while_upstream_is_slow() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Json(json!({
                "choices": [{"message": {"content": "late but fine"}, "finish_reason": "stop"}]
            }))
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(
        base_url,
        StreamingConfig {
            heartbeat_interval_ms: 40,
            ..fast_streaming(8)
        },
    );

    let response = dispatch_request(state, stream_request(None))
        .await
        .expect("dispatch");
    let records = read_records(response).await;

    let first_data = records
        .iter()
        .position(|record| matches!(record, SseRecord::Event(_)))
        .expect("data event");
    let heartbeats = records
        .iter()
        .filter(|record| matches!(record, SseRecord::Comment(text) if text == "heartbeat"))
        .count();
    assert!(heartbeats >= 2, "expected heartbeats, got {heartbeats}");
    assert!(records[first_data..]
        .iter()
        .all(|record| matches!(record, SseRecord::Event(_))));

    let chunks = data_payloads(&records);
    let text: String = chunks
        .iter()
        .filter_map(|chunk| chunk["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(text, "late but fine");
    let id = chunks[0]["id"].as_str().expect("chunk id");
    assert!(id.starts_with("chatcmpl-"));

    server.abort();
}

#[tokio::test]
async fn test_stream_of_empty_completion_has_one_empty_delta() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({"choices": [{"message": {"content": ""}, "finish_reason": "stop"}]}))
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url, fast_streaming(8));

    let response = dispatch_request(state, stream_request(None))
        .await
        .expect("dispatch");
    let chunks = data_payloads(&read_records(response).await);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["choices"][0]["delta"]["content"], "");
    assert_eq!(chunks[1]["choices"][0]["finish_reason"], "stop");

    server.abort();
}
