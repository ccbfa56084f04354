use super::{AppConfig, ConfigError};

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_streaming(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.connect_timeout == 0 {
        return Err(validation_err(
            "server.connect_timeout must be greater than 0",
        ));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let base_url = config.upstream.base_url.trim();
    let parsed = url::Url::parse(base_url).map_err(|err| {
        validation_err(format!("upstream.base_url '{base_url}' is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if parsed.host_str().is_none() {
        return Err(validation_err("upstream.base_url must include a host"));
    }
    Ok(())
}

fn validate_streaming(config: &AppConfig) -> Result<(), ConfigError> {
    let streaming = &config.streaming;
    if streaming.heartbeat_interval_ms == 0 {
        return Err(validation_err(
            "streaming.heartbeat_interval_ms must be greater than 0",
        ));
    }
    if streaming.chunk_size == 0 {
        return Err(validation_err("streaming.chunk_size must be greater than 0"));
    }
    if streaming.channel_capacity == 0 {
        return Err(validation_err(
            "streaming.channel_capacity must be greater than 0",
        ));
    }
    if streaming.chunk_jitter_ms > streaming.chunk_delay_ms {
        return Err(validation_err(format!(
            "streaming.chunk_jitter_ms ({}) cannot exceed streaming.chunk_delay_ms ({})",
            streaming.chunk_jitter_ms, streaming.chunk_delay_ms
        )));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
