// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::error::BridgeError;

/// Configuration for the bridge daemon
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// UDP listen address (`host:port`), `None` disables the listener
    pub listen_udp: Option<String>,
    /// TCP listen address (`host:port`), `None` disables the listener
    pub listen_tcp: Option<String>,
    /// Unix datagram socket path, `None` disables the listener
    pub listen_unixgram: Option<String>,
    /// Queue flush threshold, in events
    pub queue_size: usize,
    /// Periodic flush cadence for partial batches
    pub queue_interval: Duration,
    /// Datagram read-buffer size in bytes
    pub read_buffer: usize,
    /// Max bytes in one TCP line before the connection is reset
    pub tcp_line_limit: usize,
    /// Prometheus exposition address (`host:port`)
    pub http_addr: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_udp: Some("0.0.0.0:9125".to_string()),
            listen_tcp: Some("0.0.0.0:9125".to_string()),
            listen_unixgram: None,
            queue_size: 1000,
            queue_interval: Duration::from_millis(200),
            read_buffer: 65535,
            tcp_line_limit: 4096,
            http_addr: "0.0.0.0:9102".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// A listen variable distinguishes "unset" (use the default) from "set to
/// empty" (disable the listener).
fn listen_var(name: &str) -> Option<Option<String>> {
    match env::var(name) {
        Ok(value) if value.is_empty() => Some(None),
        Ok(value) => Some(Some(value)),
        Err(_) => None,
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

impl BridgeConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, BridgeError> {
        let defaults = Self::default();

        let config = Self {
            listen_udp: listen_var("STATSD_LISTEN_UDP").unwrap_or(defaults.listen_udp),
            listen_tcp: listen_var("STATSD_LISTEN_TCP").unwrap_or(defaults.listen_tcp),
            listen_unixgram: listen_var("STATSD_LISTEN_UNIXGRAM")
                .unwrap_or(defaults.listen_unixgram),
            queue_size: parsed_var("STATSD_QUEUE_SIZE").unwrap_or(defaults.queue_size),
            queue_interval: parsed_var("STATSD_QUEUE_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.queue_interval),
            read_buffer: parsed_var("STATSD_READ_BUFFER").unwrap_or(defaults.read_buffer),
            tcp_line_limit: parsed_var("STATSD_TCP_LINE_LIMIT").unwrap_or(defaults.tcp_line_limit),
            http_addr: env::var("STATSD_HTTP_ADDR").unwrap_or(defaults.http_addr),
            log_level: env::var("STATSD_LOG_LEVEL")
                .map(|value| value.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.queue_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "queue size must be greater than 0".to_string(),
            ));
        }

        if self.queue_interval.is_zero() {
            return Err(BridgeError::InvalidConfig(
                "queue interval must be greater than 0".to_string(),
            ));
        }

        if self.read_buffer == 0 {
            return Err(BridgeError::InvalidConfig(
                "read buffer must be greater than 0".to_string(),
            ));
        }

        if self.tcp_line_limit == 0 {
            return Err(BridgeError::InvalidConfig(
                "TCP line limit must be greater than 0".to_string(),
            ));
        }

        if self.listen_udp.is_none() && self.listen_tcp.is_none() && self.listen_unixgram.is_none()
        {
            return Err(BridgeError::InvalidConfig(
                "at least one listener must be enabled".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(BridgeError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_queue_size() {
        let config = BridgeConfig {
            queue_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_queue_interval() {
        let config = BridgeConfig {
            queue_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = BridgeConfig {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_all_listeners_disabled() {
        let config = BridgeConfig {
            listen_udp: None,
            listen_tcp: None,
            listen_unixgram: None,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_log_levels() {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        for level in valid_levels {
            let config = BridgeConfig {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Log level '{}' should be valid",
                level
            );
        }
    }
}
