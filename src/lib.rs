//! Fetch tunnel library.
//!
//! Runs an extraction engine on the server while every outbound HTTP fetch
//! it makes is performed by a remote peer over a WebSocket.
//!
//! # Architecture Overview
//!
//! ```text
//!   Peer                         ┌──────────────────────────────────────────────┐
//!   ───── GET /v1?videoID ──────▶│ http::connect   (job id, rate limit)         │
//!                                │      │                                        │
//!                                │      ▼                                        │
//!   ◀──── urlRequest ────────────│ tunnel::session ◀── bridge ──▶ worker thread │
//!   ───── reply + bodies ───────▶│      │                        extraction     │
//!                                │      │                        engine         │
//!   ◀──── result / error ────────│      ▼                                        │
//!                                │   close                                       │
//!                                └──────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod tunnel;

// Engine side
pub mod extraction;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::TunnelConfig;
pub use error::{TunnelError, TunnelResult};
pub use http::TunnelServer;
pub use lifecycle::Shutdown;
