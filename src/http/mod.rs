//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, TraceLayer, connect info)
//!     → GET /health → "OK"
//!     → GET /v1?videoID=..
//!         → connect.rs (job id → rate limit → upgrade → record)
//!         → tunnel::Session on the upgraded socket
//! ```
//!
//! # Design Decisions
//! - Rejections are plain HTTP responses; nothing is upgraded for them
//! - The limiter records only admissions that actually upgrade

pub mod connect;
pub mod server;

pub use connect::ConnectParams;
pub use server::{AppState, TunnelServer};
