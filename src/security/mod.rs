//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection request:
//!     → job id validation (protocol::job)
//!     → rate_limit.rs (per-identity sliding window)
//!     → upgrade to tunnel session
//! ```
//!
//! # Design Decisions
//! - Fail closed: rejected peers never reach the upgrade
//! - Identity = peer IP + declared User-Agent
//! - No persistence across restarts

pub mod rate_limit;

pub use rate_limit::{client_key, RateLimiter};
