//! Extraction subsystem.
//!
//! # Data Flow
//! ```text
//! Session worker
//!     → adapter.rs run_extraction
//!         → EngineFactory::build(TunnelTransport)
//!         → ExtractionEngine::extract(job)
//!             → Transport::fetch  (blocking; bridge → peer → bridge)
//!             → TransportResponse (Read over buffered body)
//!         → RawInfo
//!     → adapter.rs adapt_formats → Vec<StreamVariant>
//! ```
//!
//! # Design Decisions
//! - Engines receive their transport at construction; no interception
//! - Engines are synchronous; they run on pool workers, never on the I/O task
//! - Non-numeric format ids are filtered silently

pub mod adapter;
pub mod engine;
pub mod mime;
pub mod player;

pub use adapter::{adapt_formats, run_extraction, BufferedResponse, TunnelTransport};
pub use engine::{
    EngineError, EngineFactory, ExtractionEngine, RawFormat, RawInfo, Transport, TransportRequest,
    TransportResponse,
};
pub use player::PlayerApiEngine;
