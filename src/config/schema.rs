//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tunnel server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the tunnel server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TunnelConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-identity admission control.
    pub rate_limit: RateLimitConfig,

    /// Fetch exchange settings.
    pub tunnel: TunnelSettings,

    /// Extraction worker pool.
    pub workers: WorkerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Startup/shutdown behaviour.
    pub lifecycle: LifecycleConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Sliding-window rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Maximum admitted sessions per identity inside one window.
    pub max_requests: usize,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 10,
        }
    }
}

/// Settings for the request/reply exchange with the peer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// Deadline for a single fetch reply, in milliseconds.
    pub fetch_timeout_ms: u64,

    /// Largest body (request or reply) accepted on the channel.
    pub max_body_bytes: usize,

    /// User-Agent injected when the engine sends none.
    pub default_user_agent: String,
}

impl TunnelSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 30_000,
            max_body_bytes: 64 * 1024 * 1024,
            default_user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Browser-like User-Agent used when the engine does not set one.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Extraction worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum extraction jobs running at once.
    pub pool_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            pool_size: cores * 2 + 1,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long shutdown waits for active sessions.
    pub drain_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: TunnelConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.tunnel.fetch_timeout(), Duration::from_secs(30));
        assert!(config.workers.pool_size >= 3);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_sections() {
        let config: TunnelConfig = toml::from_str(
            r#"
            [rate_limit]
            max_requests = 3

            [tunnel]
            fetch_timeout_ms = 250

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.tunnel.fetch_timeout(), Duration::from_millis(250));
        assert_eq!(config.tunnel.default_user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
