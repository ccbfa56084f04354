use std::sync::Arc;

use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(state: &Arc<AppState>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "fake-stream-rs is running",
        "config": {
            "upstream_endpoint": state.upstream.endpoint().as_str(),
            "api_key_configured": config.upstream.credential().is_some(),
            "default_model": config.upstream.default_model,
            "streaming": {
                "heartbeat_interval_ms": config.streaming.heartbeat_interval_ms,
                "chunk_unit": config.streaming.chunk_unit,
                "chunk_size": config.streaming.chunk_size,
                "chunk_delay_ms": config.streaming.chunk_delay_ms,
                "chunk_jitter_ms": config.streaming.chunk_jitter_ms,
            }
        }
    }))
}
