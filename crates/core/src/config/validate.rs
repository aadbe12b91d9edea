use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let engine_url = config.engine.url.trim();
    if !(engine_url.starts_with("http://") || engine_url.starts_with("https://")) {
        return Err(invalid(format!(
            "engine.url must be an http(s) URL, got {:?}",
            config.engine.url
        )));
    }

    for (field, url) in [("store.url", &config.store.url), ("queue.url", &config.queue.url)] {
        if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
            return Err(invalid(format!(
                "{} must be a redis:// URL, got {:?}",
                field, url
            )));
        }
    }

    if config.queue.stream.is_empty() || config.queue.group.is_empty() {
        return Err(invalid("queue.stream and queue.group cannot be empty"));
    }

    if config.queue.block_ms == 0 {
        return Err(invalid("queue.block_ms cannot be 0"));
    }

    if config.events.completion_channel.is_empty() || config.events.progress_channel.is_empty() {
        return Err(invalid("event channel names cannot be empty"));
    }

    if config.store.completed_window == 0 {
        return Err(invalid("store.completed_window cannot be 0"));
    }

    if config.viewers.heartbeat_secs == 0 {
        return Err(invalid("viewers.heartbeat_secs cannot be 0"));
    }

    if config.viewers.channel_capacity == 0 {
        return Err(invalid("viewers.channel_capacity cannot be 0"));
    }

    Ok(())
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_engine_url_requires_http() {
        let mut config = Config::default();
        config.engine.url = "esrgan-engine:7001".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("engine.url"));
    }

    #[test]
    fn test_validate_store_url_requires_redis_scheme() {
        let mut config = Config::default();
        config.store.url = "redis:6379".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("store.url"));
    }

    #[test]
    fn test_validate_zero_heartbeat_fails() {
        let mut config = Config::default();
        config.viewers.heartbeat_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_channel_capacity_fails() {
        let mut config = Config::default();
        config.viewers.channel_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_completed_window_fails() {
        let mut config = Config::default();
        config.store.completed_window = 0;
        assert!(validate_config(&config).is_err());
    }
}
