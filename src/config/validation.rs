//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! Returns all validation errors, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::TunnelConfig;

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::Zero("rate_limit.window_secs"));
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::Zero("rate_limit.max_requests"));
    }
    if config.tunnel.fetch_timeout_ms == 0 {
        errors.push(ValidationError::Zero("tunnel.fetch_timeout_ms"));
    }
    if config.tunnel.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("tunnel.max_body_bytes"));
    }
    if config.workers.pool_size == 0 {
        errors.push(ValidationError::Zero("workers.pool_size"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
