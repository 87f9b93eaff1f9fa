//! OS signal handling.
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGINT and SIGTERM both mean graceful shutdown
//! - A second signal is logged but changes nothing; the drain timeout bounds exit

use crate::lifecycle::shutdown::Shutdown;

/// Resolve on the first SIGINT or SIGTERM, naming the signal.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
            _ = term.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
}

/// Trigger `shutdown` on every received signal.
pub async fn forward_signals(shutdown: Shutdown) {
    loop {
        match wait_for_signal().await {
            Ok(signal) => {
                if shutdown.trigger() {
                    tracing::info!(signal, "Graceful shutdown requested");
                } else {
                    tracing::warn!(signal, "Shutdown already in progress");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return;
            }
        }
    }
}
