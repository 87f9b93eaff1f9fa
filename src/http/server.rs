//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the connection and liveness endpoints
//! - Wire up tracing middleware
//! - Bind server to listener, with peer addresses for admission keys
//! - Sweep idle rate-limit state in the background
//! - Stop accepting on shutdown, then drain active sessions

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::TunnelConfig;
use crate::extraction::EngineFactory;
use crate::http::connect::connect_handler;
use crate::security::RateLimiter;
use crate::tunnel::{SessionContext, SessionTracker, WorkerPool};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub sessions: Arc<SessionContext>,
}

/// HTTP front end of the tunnel.
pub struct TunnelServer {
    router: Router,
    state: AppState,
    config: TunnelConfig,
}

impl TunnelServer {
    pub fn new(config: TunnelConfig, engine: Arc<dyn EngineFactory>) -> Self {
        let state = AppState {
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            sessions: Arc::new(SessionContext {
                engine,
                workers: WorkerPool::new(config.workers.pool_size),
                settings: config.tunnel.clone(),
                tracker: SessionTracker::new(),
            }),
        };
        let router = Self::build_router(state.clone());
        Self {
            router,
            state,
            config,
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/v1", get(connect_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The router alone, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.state.sessions.tracker
    }

    /// Serve until `shutdown` fires, then wait for sessions to drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            workers = self.state.sessions.workers.size(),
            "Tunnel server starting"
        );

        let sweeper = tokio::spawn(sweep_rate_limits(
            self.state.limiter.clone(),
            self.config.rate_limit.window(),
        ));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, no longer accepting");
            })
            .await?;
        sweeper.abort();

        let drain = Duration::from_secs(self.config.lifecycle.drain_timeout_secs);
        let remaining = self.state.sessions.tracker.wait_for_drain(drain).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Drain timeout reached with sessions still active");
        }

        tracing::info!("Tunnel server stopped");
        Ok(())
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Forget identities whose window has emptied.
async fn sweep_rate_limits(limiter: Arc<RateLimiter>, window: Duration) {
    let mut ticker = tokio::time::interval(window.max(Duration::from_secs(1)));
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = limiter.sweep();
        if removed > 0 {
            tracing::debug!(removed, tracked = limiter.tracked_keys(), "Swept idle rate-limit keys");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ExtractionEngine, Transport};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> TunnelServer {
        let engine: Arc<dyn EngineFactory> = Arc::new(|t: Arc<dyn Transport>| {
            Box::new(crate::extraction::PlayerApiEngine::new(t)) as Box<dyn ExtractionEngine>
        });
        TunnelServer::new(TunnelConfig::default(), engine)
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let response = server()
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = server()
            .router()
            .oneshot(Request::get("/v2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
