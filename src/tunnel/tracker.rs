//! Session identity and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Count active sessions for graceful shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::observability::metrics;

/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Tracks active sessions for graceful shutdown.
///
/// The live count sits in a watch channel, so draining wakes on each release
/// instead of polling.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new active session. Returns a guard that decrements on drop.
    pub fn track(&self) -> SessionGuard {
        self.active.send_modify(|count| *count += 1);
        metrics::set_active_sessions(self.active_count());
        SessionGuard {
            active: Arc::clone(&self.active),
            id: SessionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until every session has ended or `timeout` passes.
    /// Returns the number of sessions still running.
    pub async fn wait_for_drain(&self, timeout: Duration) -> u64 {
        let mut rx = self.active.subscribe();
        let _ = tokio::time::timeout(timeout, rx.wait_for(|count| *count == 0)).await;
        self.active_count()
    }
}

/// Guard that tracks a session's lifetime.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<watch::Sender<u64>>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
        metrics::set_active_sessions(*self.active.borrow());
        tracing::trace!(session_id = %self.id, "Session released");
    }
}
