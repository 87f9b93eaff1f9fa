//! Extraction engine contract.
//!
//! An engine is handed a [`Transport`] when it is built and performs every
//! network request through it. It never sees the tunnel, only blocking
//! `fetch` calls returning buffered, readable responses.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::error::TunnelError;
use crate::protocol::{FetchResponse, JobId};

/// A request as the engine phrases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub allow_redirects: bool,
    pub apply_cookies_on_redirect: bool,
    pub save_intermediate_responses: bool,
}

impl TransportRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: HashMap::new(),
            body: None,
            allow_redirects: true,
            apply_cookies_on_redirect: false,
            save_intermediate_responses: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// The response shape engines read from.
pub trait TransportResponse: Read + Send {
    /// Final URL after redirects.
    fn url(&self) -> &str;

    fn status(&self) -> Option<u16>;

    fn headers(&self) -> &HashMap<String, String>;

    /// Case-insensitive header lookup.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Redirect hops, when the request asked for them.
    fn intermediates(&self) -> &[FetchResponse];
}

/// The single capability an engine gets for network access.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: TransportRequest) -> Result<Box<dyn TransportResponse>, TunnelError>;
}

/// One format descriptor as engines report it (yt-dlp style keys).
///
/// Rates are kilobits per second and may be fractional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    #[serde(default)]
    pub url: String,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub tbr: Option<f64>,
    pub abr: Option<f64>,
    pub vbr: Option<f64>,
    pub filesize: Option<u64>,
}

/// Engine output for one job.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawInfo {
    pub formats: Option<Vec<RawFormat>>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// A fetch failed inside the tunnel; the job must stop.
    #[error(transparent)]
    Transport(#[from] TunnelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("Content unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

/// A configured engine, bound to one transport.
pub trait ExtractionEngine: Send {
    /// `Ok(None)` means the engine finished but found nothing.
    fn extract(&self, job: &JobId) -> Result<Option<RawInfo>, EngineError>;
}

/// Builds an engine around the transport of one session.
pub trait EngineFactory: Send + Sync {
    fn build(&self, transport: Arc<dyn Transport>) -> Box<dyn ExtractionEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn(Arc<dyn Transport>) -> Box<dyn ExtractionEngine> + Send + Sync,
{
    fn build(&self, transport: Arc<dyn Transport>) -> Box<dyn ExtractionEngine> {
        self(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_format_from_engine_json() {
        let raw: RawFormat = serde_json::from_str(
            r#"{"format_id":"18","url":"https://v/18","ext":"mp4","vcodec":"avc1","acodec":"none","tbr":1234.5,"quality":3}"#,
        )
        .unwrap();
        assert_eq!(raw.format_id.as_deref(), Some("18"));
        assert_eq!(raw.tbr, Some(1234.5));
        assert_eq!(raw.filesize, None);
    }

    #[test]
    fn test_request_builder() {
        let req = TransportRequest::new("POST", "https://x/")
            .header("Content-Type", "application/json")
            .body(b"{}".to_vec());
        assert_eq!(req.method, "POST");
        assert_eq!(req.body.as_deref(), Some(&b"{}"[..]));
        assert!(req.allow_redirects);
    }

    #[test]
    fn test_transport_error_passes_through() {
        let err: EngineError = TunnelError::ConnectionClosed.into();
        assert_eq!(err.to_string(), "Tunnel connection closed");
    }
}
