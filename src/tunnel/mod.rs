//! Tunnel session subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted upgrade
//!     → session.rs Session::run
//!         → worker.rs WorkerPool::spawn(run_extraction)      [blocking thread]
//!         ← bridge.rs BridgeReceiver::recv (PendingFetch)    [session task]
//!         → encode_request → peer → ResponseAssembler
//!         → PendingFetch::drive (deadline) → worker resumes
//!     → result / error frame → close
//! ```
//!
//! # Design Decisions
//! - One session task per connection; it alone owns the socket
//! - Engines block on a worker; the session task never blocks
//! - At most one fetch outstanding per session
//! - The tracker counts live sessions so shutdown can drain them

pub mod bridge;
pub mod session;
pub mod tracker;
pub mod worker;

pub use bridge::{Bridge, BridgeReceiver, PendingFetch};
pub use session::{Session, SessionContext, SessionState};
pub use tracker::{SessionGuard, SessionId, SessionTracker};
pub use worker::WorkerPool;
