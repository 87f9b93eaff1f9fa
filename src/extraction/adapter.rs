//! Glue between the engine and the tunnel.
//!
//! # Responsibilities
//! - Present the bridge as the engine's [`Transport`]
//! - Inject a default User-Agent when the engine sends none
//! - Serve buffered reply bodies through `Read` with a cursor
//! - Map raw engine formats onto [`StreamVariant`]s

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{TunnelError, TunnelResult};
use crate::extraction::engine::{
    EngineError, EngineFactory, RawFormat, RawInfo, Transport, TransportRequest, TransportResponse,
};
use crate::protocol::{FetchRequest, FetchResponse, JobId, StreamVariant};
use crate::tunnel::bridge::Bridge;

/// [`Transport`] that sends every request through a session's bridge.
#[derive(Debug, Clone)]
pub struct TunnelTransport {
    bridge: Bridge,
    default_user_agent: String,
}

impl TunnelTransport {
    pub fn new(bridge: Bridge, default_user_agent: impl Into<String>) -> Self {
        Self {
            bridge,
            default_user_agent: default_user_agent.into(),
        }
    }

    fn to_fetch_request(&self, request: TransportRequest) -> FetchRequest {
        let mut headers = request.headers;
        if !headers.keys().any(|k| k.eq_ignore_ascii_case("user-agent")) {
            headers.insert("User-Agent".to_string(), self.default_user_agent.clone());
        }
        FetchRequest {
            id: Uuid::new_v4().to_string(),
            url: request.url,
            method: request.method,
            headers,
            body: request.body,
            allow_redirects: request.allow_redirects,
            apply_cookies_on_redirect: request.apply_cookies_on_redirect,
            save_intermediate_responses: request.save_intermediate_responses,
        }
    }
}

impl Transport for TunnelTransport {
    fn fetch(&self, request: TransportRequest) -> Result<Box<dyn TransportResponse>, TunnelError> {
        let request = self.to_fetch_request(request);
        tracing::debug!(fetch_id = %request.id, method = %request.method, url = %request.url, "Tunnelling fetch");
        let response = self.bridge.fetch(request)?;
        Ok(Box::new(BufferedResponse::new(response)))
    }
}

/// A fully received reply, read incrementally.
#[derive(Debug)]
pub struct BufferedResponse {
    inner: FetchResponse,
    cursor: usize,
}

impl BufferedResponse {
    pub fn new(inner: FetchResponse) -> Self {
        Self { inner, cursor: 0 }
    }
}

impl Read for BufferedResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.inner.body[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }
}

impl TransportResponse for BufferedResponse {
    fn url(&self) -> &str {
        &self.inner.url
    }

    fn status(&self) -> Option<u16> {
        self.inner.status_code
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.inner.headers
    }

    fn intermediates(&self) -> &[FetchResponse] {
        self.inner.intermediates.as_deref().unwrap_or_default()
    }
}

/// Build an engine on `transport`, run it for `job`, and adapt its formats.
pub fn run_extraction(
    factory: &dyn EngineFactory,
    transport: Arc<dyn Transport>,
    job: &JobId,
) -> TunnelResult<Vec<StreamVariant>> {
    let engine = factory.build(transport);
    let info = engine.extract(job).map_err(|e| match e {
        EngineError::Transport(err) => err,
        other => TunnelError::ExtractionFailure(other.to_string()),
    })?;
    adapt_formats(info)
}

/// Map engine output to the public shape. Nothing usable is a failure.
pub fn adapt_formats(info: Option<RawInfo>) -> TunnelResult<Vec<StreamVariant>> {
    let formats = info
        .and_then(|info| info.formats)
        .filter(|formats| !formats.is_empty())
        .ok_or_else(|| TunnelError::ExtractionFailure("engine returned no formats".into()))?;

    let total = formats.len();
    let variants: Vec<StreamVariant> = formats.into_iter().filter_map(adapt_format).collect();
    tracing::debug!(total, kept = variants.len(), "Adapted engine formats");

    if variants.is_empty() {
        return Err(TunnelError::ExtractionFailure(
            "no format with a numeric identifier".into(),
        ));
    }
    Ok(variants)
}

fn adapt_format(raw: RawFormat) -> Option<StreamVariant> {
    let itag = raw.format_id.as_deref().and_then(parse_numeric_id);
    let Some(itag) = itag else {
        tracing::trace!(format_id = ?raw.format_id, "Skipping non-numeric format");
        return None;
    };
    Some(StreamVariant {
        url: raw.url,
        itag,
        ext: raw.ext.unwrap_or_else(|| "unknown".to_string()),
        video_codec: normalize_codec(raw.vcodec),
        audio_codec: normalize_codec(raw.acodec),
        average_bitrate: kbps_to_bps(raw.tbr),
        audio_bitrate: kbps_to_bps(raw.abr),
        video_bitrate: kbps_to_bps(raw.vbr),
        filesize: raw.filesize,
    })
}

fn parse_numeric_id(id: &str) -> Option<u64> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match id.parse() {
        Ok(itag) => Some(itag),
        Err(e) => {
            tracing::warn!(format_id = %id, error = %e, "Numeric format id out of range, skipping");
            None
        }
    }
}

fn normalize_codec(codec: Option<String>) -> Option<String> {
    codec.filter(|c| c != "none")
}

/// Fractional kbit/s to whole bit/s, truncating.
fn kbps_to_bps(rate: Option<f64>) -> Option<u64> {
    rate.filter(|r| r.is_finite() && *r >= 0.0)
        .map(|r| (r * 1000.0) as u64)
}
