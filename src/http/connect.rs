//! Connection endpoint: admission, then WebSocket upgrade.
//!
//! # Admission Order
//! 1. Job id validation (400, nothing recorded)
//! 2. Rate limit check (429 with `Retry-After`, nothing recorded)
//! 3. Upgrade validity (axum's own rejection, nothing recorded)
//! 4. Hand the socket to a [`Session`]
//!
//! Steps 2 and 4 share one limiter call, so the admission is recorded under
//! the same entry lock that checked it.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::TunnelError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::protocol::{ErrorPayload, JobId};
use crate::security::client_key;
use crate::tunnel::{Session, SessionState};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "videoID")]
    pub video_id: Option<String>,
}

pub async fn connect_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let job: JobId = match params.video_id.as_deref().unwrap_or_default().parse() {
        Ok(job) => job,
        Err(err) => {
            tracing::debug!(peer = %addr, error = %err, "Rejected connection with invalid job id");
            metrics::record_rejected("invalid_input");
            return rejection(StatusCode::BAD_REQUEST, &err);
        }
    };

    // Only a valid upgrade is recorded; the check itself comes first.
    let key = client_key(addr.ip(), &headers);
    if !state.limiter.admit_and_record(&key, upgrade.is_ok()) {
        let err = TunnelError::RateLimited {
            retry_after: state.limiter.window(),
        };
        tracing::info!(peer = %addr, job_id = %job, "Rate limit exceeded");
        metrics::record_rejected("rate_limited");
        return rejection(StatusCode::TOO_MANY_REQUESTS, &err);
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejected) => return rejected.into_response(),
    };

    tracing::info!(peer = %addr, job_id = %job, "Session admitted");

    let sessions = state.sessions.clone();
    let max_message = sessions.settings.max_body_bytes;
    upgrade
        .max_message_size(max_message)
        .max_frame_size(max_message)
        .on_failed_upgrade(move |e| {
            tracing::warn!(peer = %addr, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            Session::new(job, socket, sessions).run().await;
        })
}

fn rejection(status: StatusCode, err: &TunnelError) -> Response {
    metrics::record_session(SessionState::Rejected.as_str());
    let payload = ErrorPayload::from(err);
    let mut response = (status, Json(&payload)).into_response();
    if let Some(secs) = payload.retry_after {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}
