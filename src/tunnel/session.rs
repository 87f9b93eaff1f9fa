//! One admitted peer connection, from upgrade to close.
//!
//! # Responsibilities
//! - Start the extraction job on a pool worker
//! - Serve the worker's fetches over the socket, one at a time
//! - Treat unsolicited peer frames as protocol violations
//! - Deliver exactly one final message, then close the socket once

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use tokio::task::JoinError;

use crate::config::TunnelSettings;
use crate::error::{TunnelError, TunnelResult};
use crate::extraction::{run_extraction, EngineFactory, Transport, TunnelTransport};
use crate::observability::metrics;
use crate::protocol::codec::{encode_error, encode_request, encode_result};
use crate::protocol::{FetchRequest, FetchResponse, Frame, JobId, ResponseAssembler, StreamVariant};
use crate::tunnel::bridge::{self, PendingFetch};
use crate::tunnel::tracker::{SessionGuard, SessionTracker};
use crate::tunnel::worker::WorkerPool;

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Passed admission, socket upgraded.
    Admitted,
    /// Job running, no fetch outstanding.
    Idle,
    /// A fetch request is out; waiting for the peer's reply.
    AwaitingFetchResponse,
    /// Job finished; result being delivered.
    SendingResult,
    /// Result delivered and socket closed.
    Closed,
    /// Refused before the upgrade (rate limit, bad id).
    Rejected,
    /// Ended on a timeout, disconnect, violation or extraction failure.
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Admitted => "admitted",
            SessionState::Idle => "idle",
            SessionState::AwaitingFetchResponse => "awaiting_fetch_response",
            SessionState::SendingResult => "sending_result",
            SessionState::Closed => "closed",
            SessionState::Rejected => "rejected",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Closed | SessionState::Rejected | SessionState::Failed
        )
    }
}

/// Shared, per-server dependencies of every session.
pub struct SessionContext {
    pub engine: Arc<dyn EngineFactory>,
    pub workers: WorkerPool,
    pub settings: TunnelSettings,
    pub tracker: SessionTracker,
}

pub struct Session {
    job: JobId,
    socket: WebSocket,
    ctx: Arc<SessionContext>,
    state: SessionState,
    guard: SessionGuard,
}

impl Session {
    pub fn new(job: JobId, socket: WebSocket, ctx: Arc<SessionContext>) -> Self {
        let guard = ctx.tracker.track();
        Self {
            job,
            socket,
            ctx,
            state: SessionState::Admitted,
            guard,
        }
    }

    /// Drive the session to completion and return its terminal state.
    pub async fn run(mut self) -> SessionState {
        tracing::info!(session_id = %self.guard.id(), job_id = %self.job, "Session started");

        let terminal = match self.extract().await {
            Ok(variants) => {
                self.transition(SessionState::SendingResult);
                match self.send(encode_result(&variants)).await {
                    Ok(()) => {
                        tracing::info!(
                            session_id = %self.guard.id(),
                            job_id = %self.job,
                            variants = variants.len(),
                            "Result delivered"
                        );
                        SessionState::Closed
                    }
                    Err(err) => {
                        tracing::warn!(session_id = %self.guard.id(), error = %err, "Result delivery failed");
                        SessionState::Failed
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %self.guard.id(),
                    job_id = %self.job,
                    code = err.code(),
                    error = %err,
                    "Session failed"
                );
                if err != TunnelError::ConnectionClosed {
                    let _ = self.send(encode_error(&err)).await;
                }
                SessionState::Failed
            }
        };

        self.transition(terminal);
        let _ = self.socket.send(Message::Close(None)).await;
        metrics::record_session(terminal.as_str());
        terminal
    }

    async fn extract(&mut self) -> TunnelResult<Vec<StreamVariant>> {
        let (bridge, mut fetches) = bridge::channel();
        let transport: Arc<dyn Transport> = Arc::new(TunnelTransport::new(
            bridge,
            self.ctx.settings.default_user_agent.clone(),
        ));
        let engine = self.ctx.engine.clone();
        let job = self.job.clone();

        // Waiting for a worker still notices the peer leaving.
        let ctx = self.ctx.clone();
        let spawn = ctx
            .workers
            .spawn(move || run_extraction(engine.as_ref(), transport, &job));
        tokio::pin!(spawn);
        let mut worker = loop {
            tokio::select! {
                spawned = &mut spawn => break spawned?,
                inbound = self.socket.recv() => check_idle(inbound)?,
            }
        };
        self.transition(SessionState::Idle);

        let outcome = loop {
            tokio::select! {
                pending = fetches.recv() => match pending {
                    Some(pending) => {
                        if let Err(err) = self.serve_fetch(pending).await {
                            break Err(err);
                        }
                        self.transition(SessionState::Idle);
                    }
                    None => break joined((&mut worker).await),
                },
                result = &mut worker => break joined(result),
                inbound = self.socket.recv() => {
                    if let Err(err) = check_idle(inbound) {
                        break Err(err);
                    }
                }
            }
        };

        // A worker still running sees ConnectionClosed on its next fetch.
        fetches.close();
        outcome
    }

    async fn serve_fetch(&mut self, pending: PendingFetch) -> TunnelResult<()> {
        let fetch_id = pending.request().id.clone();
        self.transition(SessionState::AwaitingFetchResponse);
        tracing::debug!(
            session_id = %self.guard.id(),
            job_id = %self.job,
            fetch_id = %fetch_id,
            url = %pending.request().url,
            "Forwarding fetch to peer"
        );

        let start = Instant::now();
        let deadline = self.ctx.settings.fetch_timeout();
        let max_body_bytes = self.ctx.settings.max_body_bytes;
        let socket = &mut self.socket;
        let outcome = pending
            .drive(deadline, |request| exchange(socket, request, max_body_bytes))
            .await;

        match &outcome {
            Ok(()) => {
                metrics::record_fetch("ok", start);
                tracing::debug!(
                    session_id = %self.guard.id(),
                    fetch_id = %fetch_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Fetch answered"
                );
            }
            Err(err) => {
                metrics::record_fetch(err.code(), start);
                tracing::warn!(
                    session_id = %self.guard.id(),
                    fetch_id = %fetch_id,
                    error = %err,
                    "Fetch failed"
                );
            }
        }
        outcome
    }

    async fn send(&mut self, frame: Frame) -> TunnelResult<()> {
        self.socket
            .send(to_message(frame))
            .await
            .map_err(|_| TunnelError::ConnectionClosed)
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(
            session_id = %self.guard.id(),
            from = self.state.as_str(),
            to = next.as_str(),
            "Session transition"
        );
        self.state = next;
    }
}

/// Send one request and read frames until its reply is complete.
async fn exchange(
    socket: &mut WebSocket,
    request: FetchRequest,
    max_body_bytes: usize,
) -> TunnelResult<FetchResponse> {
    let mut assembler = ResponseAssembler::new(request.id.clone(), max_body_bytes);
    for frame in encode_request(&request) {
        socket
            .send(to_message(frame))
            .await
            .map_err(|_| TunnelError::ConnectionClosed)?;
    }

    loop {
        let frame = match socket.recv().await {
            Some(Ok(Message::Text(text))) => Frame::Text(text.as_str().to_owned()),
            Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes.to_vec()),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                return Err(TunnelError::ConnectionClosed)
            }
        };
        if let Some(response) = assembler.feed(frame)? {
            return Ok(response);
        }
    }
}

/// Inbound traffic while no fetch is outstanding.
fn check_idle(inbound: Option<Result<Message, axum::Error>>) -> TunnelResult<()> {
    match inbound {
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(()),
        Some(Ok(Message::Text(_) | Message::Binary(_))) => Err(TunnelError::ProtocolViolation(
            "frame received with no fetch outstanding".into(),
        )),
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => Err(TunnelError::ConnectionClosed),
    }
}

fn joined(
    result: Result<TunnelResult<Vec<StreamVariant>>, JoinError>,
) -> TunnelResult<Vec<StreamVariant>> {
    result.unwrap_or_else(|e| {
        Err(TunnelError::ExtractionFailure(format!(
            "extraction worker aborted: {}",
            e
        )))
    })
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}
