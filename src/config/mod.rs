//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, NUM_WORKERS override)
//!     → validation.rs (semantic checks)
//!     → TunnelConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    LifecycleConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig,
    TunnelConfig, TunnelSettings, WorkerConfig,
};
