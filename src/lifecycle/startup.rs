//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Start the metrics exporter when enabled
//! - Bind the listener and begin accepting traffic
//! - Wire OS signals to graceful shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::TunnelConfig;
use crate::extraction::EngineFactory;
use crate::http::TunnelServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::forward_signals;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0:?}")]
    Config(Vec<ValidationError>),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Run the server until a signal arrives and sessions drain.
pub async fn run(config: TunnelConfig, engine: Arc<dyn EngineFactory>) -> Result<(), StartupError> {
    validate_config(&config).map_err(StartupError::Config)?;

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr);
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        window_secs = config.rate_limit.window_secs,
        max_requests = config.rate_limit.max_requests,
        fetch_timeout_ms = config.tunnel.fetch_timeout_ms,
        pool_size = config.workers.pool_size,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(forward_signals(shutdown));

    TunnelServer::new(config, engine).run(listener, receiver).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::PlayerApiEngine;

    #[tokio::test]
    async fn test_invalid_config_fails_before_binding() {
        let mut config = TunnelConfig::default();
        config.workers.pool_size = 0;
        config.listener.bind_address = "nowhere".into();

        match run(config, PlayerApiEngine::factory()).await {
            Err(StartupError::Config(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other.err()),
        }
    }
}
