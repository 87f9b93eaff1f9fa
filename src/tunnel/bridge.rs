//! Synchronous/asynchronous fetch handoff.
//!
//! # Data Flow
//! ```text
//! worker thread                          session task (async)
//! ─────────────                          ────────────────────
//! Bridge::fetch(req)
//!   lock turn gate (queues callers)
//!   blocking_send(PendingFetch) ───────▶ BridgeReceiver::recv()
//!   blocking_recv(reply) ◀───┐            PendingFetch::drive(deadline, exchange)
//!                            └─────────── reply / TunnelTimeout / ConnectionClosed
//! ```
//!
//! # Design Decisions
//! - The worker parks on a oneshot; it never spins and never touches the socket
//! - The async side owns the deadline, so every exit path answers the worker
//! - Dropping the receiver or a pending fetch wakes the worker with `ConnectionClosed`
//! - No retries: the first failure goes straight back to the caller

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::{TunnelError, TunnelResult};
use crate::protocol::{FetchRequest, FetchResponse};

/// A fetch handed from the worker to the session, awaiting its reply.
#[derive(Debug)]
pub struct PendingFetch {
    request: FetchRequest,
    reply: oneshot::Sender<TunnelResult<FetchResponse>>,
}

impl PendingFetch {
    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    /// Run one exchange bounded by `deadline` and hand its outcome to the worker.
    ///
    /// Returns the same outcome (minus the response) so the session can decide
    /// whether to keep going.
    pub async fn drive<F, Fut>(self, deadline: Duration, exchange: F) -> TunnelResult<()>
    where
        F: FnOnce(FetchRequest) -> Fut,
        Fut: Future<Output = TunnelResult<FetchResponse>>,
    {
        let PendingFetch { request, reply } = self;
        let outcome = match tokio::time::timeout(deadline, exchange(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TunnelError::TunnelTimeout(deadline)),
        };
        let status = match &outcome {
            Ok(_) => Ok(()),
            Err(e) => Err(e.clone()),
        };
        if reply.send(outcome).is_err() {
            tracing::debug!("Worker went away before its fetch resolved");
        }
        status
    }

    /// Fail the fetch without running an exchange.
    pub fn fail(self, err: TunnelError) {
        let _ = self.reply.send(Err(err));
    }
}

/// Worker-side handle. Cheap to clone; all clones share one turn gate.
#[derive(Debug, Clone)]
pub struct Bridge {
    tx: mpsc::Sender<PendingFetch>,
    turn: Arc<Mutex<()>>,
}

/// Session-side end of the bridge.
#[derive(Debug)]
pub struct BridgeReceiver {
    rx: mpsc::Receiver<PendingFetch>,
}

/// Create a connected bridge pair.
pub fn channel() -> (Bridge, BridgeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (
        Bridge {
            tx,
            turn: Arc::new(Mutex::new(())),
        },
        BridgeReceiver { rx },
    )
}

impl Bridge {
    /// Send `request` through the tunnel and park until its reply arrives.
    ///
    /// Blocking: call only from a worker thread, never from async code.
    /// Concurrent callers queue on the turn gate so at most one request is
    /// outstanding.
    pub fn fetch(&self, request: FetchRequest) -> TunnelResult<FetchResponse> {
        let _turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .blocking_send(PendingFetch {
                request,
                reply: reply_tx,
            })
            .map_err(|_| TunnelError::ConnectionClosed)?;

        reply_rx
            .blocking_recv()
            .map_err(|_| TunnelError::ConnectionClosed)?
    }

    /// True once the session side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl BridgeReceiver {
    /// Next fetch from the worker; `None` once every [`Bridge`] clone is dropped.
    pub async fn recv(&mut self) -> Option<PendingFetch> {
        self.rx.recv().await
    }

    /// Refuse further fetches. Queued ones are failed with `ConnectionClosed`.
    pub fn close(&mut self) {
        self.rx.close();
        while let Ok(pending) = self.rx.try_recv() {
            pending.fail(TunnelError::ConnectionClosed);
        }
    }
}
