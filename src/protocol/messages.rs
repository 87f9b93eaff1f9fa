//! Tunnel message types.
//!
//! Bodies never appear in these JSON shapes; they travel as binary frames
//! announced by a `body_length` field (see `codec`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TunnelError;

/// An outbound fetch the peer should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Unique per session.
    pub id: String,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub allow_redirects: bool,
    pub apply_cookies_on_redirect: bool,
    pub save_intermediate_responses: bool,
}

impl FetchRequest {
    /// A GET with the default redirect policy.
    pub fn get(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
            allow_redirects: true,
            apply_cookies_on_redirect: false,
            save_intermediate_responses: false,
        }
    }
}

/// The peer's answer to a [`FetchRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: String,
    /// `None` means the peer could not obtain a status.
    pub status_code: Option<u16>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Redirect hops, only when capture was requested.
    pub intermediates: Option<Vec<FetchResponse>>,
}

/// One playable/downloadable format surfaced to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    pub url: String,
    pub itag: u64,
    pub ext: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    /// Bits per second.
    pub average_bitrate: Option<u64>,
    pub audio_bitrate: Option<u64>,
    pub video_bitrate: Option<u64>,
    /// Bytes.
    pub filesize: Option<u64>,
}

/// JSON metadata of a `urlRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Present iff a binary body frame follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_length: Option<usize>,
    pub allow_redirects: bool,
    pub apply_cookies_on_redirect: bool,
    pub save_intermediate_responses: bool,
}

/// JSON metadata of a peer reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediates: Option<Vec<WireIntermediate>>,
}

/// A redirect hop inside a [`WireResponse`]. Hops do not nest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireIntermediate {
    pub url: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body_length: usize,
}

/// Structured error sent instead of a result or in place of the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    /// Seconds; only for `rate_limited`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&TunnelError> for ErrorPayload {
    fn from(err: &TunnelError) -> Self {
        let retry_after = match err {
            TunnelError::RateLimited { retry_after } => Some(retry_after.as_secs()),
            _ => None,
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retry_after,
        }
    }
}

/// Peer-bound envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum ServerMessage {
    #[serde(rename = "urlRequest")]
    UrlRequest(WireRequest),
    #[serde(rename = "result")]
    Result(Vec<StreamVariant>),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_envelope_tags() {
        let msg = ServerMessage::Result(vec![]);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "result", "content": []})
        );

        let msg = ServerMessage::UrlRequest(WireRequest {
            id: "f1".into(),
            url: "https://example.com/".into(),
            method: "GET".into(),
            headers: HashMap::new(),
            body_length: None,
            allow_redirects: true,
            apply_cookies_on_redirect: false,
            save_intermediate_responses: false,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "urlRequest");
        assert_eq!(value["content"]["id"], "f1");
        assert!(value["content"].get("body_length").is_none());
    }

    #[test]
    fn test_rate_limited_payload() {
        let err = TunnelError::RateLimited {
            retry_after: Duration::from_secs(60),
        };
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.code, "rate_limited");
        assert_eq!(payload.retry_after, Some(60));

        let payload = ErrorPayload::from(&TunnelError::ConnectionClosed);
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("retry_after").is_none());
    }

    #[test]
    fn test_reply_defaults() {
        let reply: WireResponse =
            serde_json::from_str(r#"{"id":"f1","url":"https://x/","body_length":0}"#).unwrap();
        assert_eq!(reply.status_code, None);
        assert!(reply.headers.is_empty());
        assert!(reply.intermediates.is_none());
    }
}
