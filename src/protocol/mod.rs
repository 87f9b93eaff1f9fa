//! Tunnel protocol subsystem.
//!
//! # Data Flow
//! ```text
//! FetchRequest (from bridge)
//!     → codec.rs encode_request → Text (+ Binary) frames → peer
//! peer reply frames
//!     → codec.rs ResponseAssembler → FetchResponse (to bridge)
//! Vec<StreamVariant> / TunnelError
//!     → codec.rs encode_result / encode_error → final Text frame
//! ```
//!
//! # Design Decisions
//! - JSON metadata, binary bodies: bodies round-trip byte for byte
//! - Replies carry the request id; a mismatch is a protocol violation
//! - Codec is socket-agnostic (axum on the server, tungstenite on the peer)

pub mod codec;
pub mod job;
pub mod messages;

pub use codec::{Frame, PeerDecoder, PeerEvent, ResponseAssembler};
pub use job::JobId;
pub use messages::{ErrorPayload, FetchRequest, FetchResponse, ServerMessage, StreamVariant};
