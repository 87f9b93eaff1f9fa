//! Error taxonomy shared by the tunnel subsystems.

use std::time::Duration;
use thiserror::Error;

/// Errors that end (or refuse) a tunnel session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    /// Malformed job identifier or request shape.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Admission refused by the rate limiter.
    #[error("Rate limit exceeded, retry after {} seconds", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// The peer did not answer a fetch request within the deadline.
    #[error("Tunnel fetch timed out after {0:?}")]
    TunnelTimeout(Duration),

    /// The peer channel went away while a fetch was outstanding.
    #[error("Tunnel connection closed")]
    ConnectionClosed,

    /// The peer sent something the protocol does not allow.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The extraction engine produced no usable data.
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),
}

impl TunnelError {
    /// Stable wire code for the in-band error payload.
    pub fn code(&self) -> &'static str {
        match self {
            TunnelError::InvalidInput(_) => "invalid_input",
            TunnelError::RateLimited { .. } => "rate_limited",
            TunnelError::TunnelTimeout(_) => "tunnel_timeout",
            TunnelError::ConnectionClosed => "connection_closed",
            TunnelError::ProtocolViolation(_) => "protocol_violation",
            TunnelError::ExtractionFailure(_) => "extraction_failure",
        }
    }

    /// Whether a caller may retry the same request later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TunnelError::RateLimited { .. })
    }
}

/// Result type for tunnel operations.
pub type TunnelResult<T> = Result<T, TunnelError>;
