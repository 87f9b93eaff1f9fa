//! Built-in engine backed by the public player API.
//!
//! Issues one player request through the transport and reports the direct
//! stream formats it lists. Ciphered formats (no `url`) and manifests are
//! not handled; such formats are left out.

use std::io::Read;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::extraction::engine::{
    EngineError, EngineFactory, ExtractionEngine, RawFormat, RawInfo, Transport, TransportRequest,
};
use crate::extraction::mime::extension_from_mime;
use crate::protocol::JobId;

pub const PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";

const CLIENT_NAME: &str = "ANDROID";
const CLIENT_NAME_ID: &str = "3";
const CLIENT_VERSION: &str = "19.09.37";
const CLIENT_USER_AGENT: &str = "com.google.android.youtube/19.09.37 (Linux; U; Android 11) gzip";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    formats: Vec<PlayerFormat>,
    #[serde(default)]
    adaptive_formats: Vec<PlayerFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerFormat {
    itag: u64,
    url: Option<String>,
    mime_type: String,
    bitrate: Option<u64>,
    average_bitrate: Option<u64>,
    content_length: Option<String>,
}

pub struct PlayerApiEngine {
    transport: Arc<dyn Transport>,
    endpoint: String,
}

impl PlayerApiEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_endpoint(transport, PLAYER_ENDPOINT)
    }

    pub fn with_endpoint(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    /// Factory for the server: one engine per session transport.
    pub fn factory() -> Arc<dyn EngineFactory> {
        Arc::new(|transport: Arc<dyn Transport>| {
            Box::new(PlayerApiEngine::new(transport)) as Box<dyn ExtractionEngine>
        })
    }

    fn player_request(&self, job: &JobId) -> TransportRequest {
        let body = json!({
            "videoId": job.as_str(),
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                    "androidSdkVersion": 30,
                    "hl": "en",
                    "gl": "US",
                }
            },
            "contentCheckOk": true,
            "racyCheckOk": true,
        });
        TransportRequest::new("POST", self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("User-Agent", CLIENT_USER_AGENT)
            .header("X-YouTube-Client-Name", CLIENT_NAME_ID)
            .header("X-YouTube-Client-Version", CLIENT_VERSION)
            .body(body.to_string())
    }
}

impl ExtractionEngine for PlayerApiEngine {
    fn extract(&self, job: &JobId) -> Result<Option<RawInfo>, EngineError> {
        let mut response = self.transport.fetch(self.player_request(job))?;
        if response.status() != Some(200) {
            return Err(EngineError::Unavailable(format!(
                "player API answered with status {:?}",
                response.status()
            )));
        }

        let mut body = Vec::new();
        response.read_to_end(&mut body)?;
        let player: PlayerResponse = serde_json::from_slice(&body)?;

        if let Some(playability) = &player.playability_status {
            if playability.status != "OK" {
                return Err(EngineError::Unavailable(
                    playability
                        .reason
                        .clone()
                        .unwrap_or_else(|| playability.status.clone()),
                ));
            }
        }

        let Some(streaming) = player.streaming_data else {
            return Ok(None);
        };
        let formats = streaming
            .formats
            .into_iter()
            .chain(streaming.adaptive_formats)
            .filter_map(to_raw_format)
            .collect();
        Ok(Some(RawInfo {
            formats: Some(formats),
        }))
    }
}

fn to_raw_format(format: PlayerFormat) -> Option<RawFormat> {
    let url = format.url?;
    let kind = format.mime_type.split('/').next().unwrap_or_default();
    let codecs = parse_codecs(&format.mime_type);

    let (vcodec, acodec) = match (kind, codecs.as_slice()) {
        ("video", [video, audio, ..]) => (Some(video.clone()), Some(audio.clone())),
        ("video", [video]) => (Some(video.clone()), Some("none".to_string())),
        ("audio", [audio, ..]) => (Some("none".to_string()), Some(audio.clone())),
        _ => (None, None),
    };

    let tbr = format
        .average_bitrate
        .or(format.bitrate)
        .map(|bps| bps as f64 / 1000.0);
    let audio_only = vcodec.as_deref() == Some("none");
    let video_only = acodec.as_deref() == Some("none");

    Some(RawFormat {
        format_id: Some(format.itag.to_string()),
        url,
        ext: Some(extension_from_mime(&format.mime_type).to_string()),
        vcodec,
        acodec,
        tbr,
        abr: tbr.filter(|_| audio_only),
        vbr: tbr.filter(|_| video_only),
        filesize: format.content_length.and_then(|len| len.parse().ok()),
    })
}

/// Codec list from a `codecs="a, b"` mime parameter.
fn parse_codecs(mime_type: &str) -> Vec<String> {
    mime_type
        .split_once("codecs=")
        .map(|(_, list)| {
            list.trim_matches(|c| c == '"' || c == '\'')
                .split(',')
                .map(|c| c.trim().trim_matches('"').to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
