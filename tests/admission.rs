//! Admission, rejection and liveness over HTTP.

use fetch_tunnel::protocol::{ErrorPayload, PeerEvent};
use tokio_tungstenite::tungstenite;

mod common;

use common::*;

#[tokio::test]
async fn test_health_endpoint() {
    let server = start_server(test_config(), json_engine()).await;
    let response = reqwest::get(server.http_url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_invalid_job_id_is_rejected_before_upgrade() {
    let server = start_server(test_config(), json_engine()).await;

    for query in ["?videoID=short", "?videoID=dQw4w9WgXc!", ""] {
        let response = reqwest::get(server.http_url(&format!("/v1{}", query)))
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query {:?}", query);
        let payload: ErrorPayload = response.json().await.unwrap();
        assert_eq!(payload.code, "invalid_input");
    }

    match try_connect(server.addr, "tooShort", None).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 400),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("invalid id was upgraded"),
    }
}

#[tokio::test]
async fn test_rate_limit_rejects_with_retry_after() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    config.rate_limit.window_secs = 60;
    let server = start_server(config, static_engine(INFO_JSON)).await;

    let mut first = try_connect(server.addr, JOB, Some("agent-a")).await.unwrap();
    assert!(matches!(first.next_event().await, Some(PeerEvent::Result(_))));

    match try_connect(server.addr, JOB, Some("agent-a")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 429);
            assert_eq!(response.headers()["retry-after"], "60");
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("second session was admitted"),
    }

    // Same address, different client: its own window.
    let mut other = try_connect(server.addr, JOB, Some("agent-b")).await.unwrap();
    assert!(matches!(other.next_event().await, Some(PeerEvent::Result(_))));

    let response = reqwest::Client::new()
        .get(server.http_url(&format!("/v1?videoID={}", JOB)))
        .header("User-Agent", "agent-a")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
    let payload: ErrorPayload = response.json().await.unwrap();
    assert_eq!(payload.code, "rate_limited");
    assert_eq!(payload.retry_after, Some(60));
}

#[tokio::test]
async fn test_plain_request_is_not_recorded() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let server = start_server(config, static_engine(INFO_JSON)).await;

    // Valid id but no upgrade headers: refused by the upgrade, not the limiter.
    let response = reqwest::Client::new()
        .get(server.http_url(&format!("/v1?videoID={}", JOB)))
        .header("User-Agent", "agent-a")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), 429);

    let mut peer = try_connect(server.addr, JOB, Some("agent-a")).await.unwrap();
    assert!(matches!(peer.next_event().await, Some(PeerEvent::Result(_))));
}

#[tokio::test]
async fn test_simultaneous_upgrades_respect_limit() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let server = start_server(config, static_engine(INFO_JSON)).await;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let addr = server.addr;
            tokio::spawn(async move { try_connect(addr, JOB, Some("burst-agent")).await })
        })
        .collect();

    let mut admitted = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 429),
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(admitted, 2);
}
