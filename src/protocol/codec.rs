//! Frame-level encoding of tunnel messages.
//!
//! # Wire Format
//! ```text
//! server → peer   Text {"type":"urlRequest","content":{..,"body_length":N?}}
//!                 [Binary N bytes]            only when body_length is set
//! peer → server   Text {"id":..,"body_length":N,"intermediates":[..]?}
//!                 Binary N bytes              always, may be empty
//!                 Binary per intermediate     in order
//! server → peer   Text {"type":"result"|"error","content":..}
//! ```
//!
//! Metadata is always JSON text; bodies are always binary. This module knows
//! nothing about the socket type; callers map [`Frame`] onto their own.

use crate::error::TunnelError;
use crate::protocol::messages::{
    ErrorPayload, FetchRequest, FetchResponse, ServerMessage, StreamVariant, WireIntermediate,
    WireRequest, WireResponse,
};

/// A single channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

fn violation(msg: impl Into<String>) -> TunnelError {
    TunnelError::ProtocolViolation(msg.into())
}

fn to_text(msg: &ServerMessage) -> Frame {
    // Every field is a string, number, bool or map of strings.
    Frame::Text(serde_json::to_string(msg).unwrap_or_default())
}

/// Encode a `urlRequest` and its optional body frame.
pub fn encode_request(request: &FetchRequest) -> Vec<Frame> {
    let meta = WireRequest {
        id: request.id.clone(),
        url: request.url.clone(),
        method: request.method.clone(),
        headers: request.headers.clone(),
        body_length: request.body.as_ref().map(Vec::len),
        allow_redirects: request.allow_redirects,
        apply_cookies_on_redirect: request.apply_cookies_on_redirect,
        save_intermediate_responses: request.save_intermediate_responses,
    };
    let mut frames = vec![to_text(&ServerMessage::UrlRequest(meta))];
    if let Some(body) = &request.body {
        frames.push(Frame::Binary(body.clone()));
    }
    frames
}

/// Encode the final result message.
pub fn encode_result(variants: &[StreamVariant]) -> Frame {
    to_text(&ServerMessage::Result(variants.to_vec()))
}

/// Encode an in-band error message.
pub fn encode_error(err: &TunnelError) -> Frame {
    to_text(&ServerMessage::Error(ErrorPayload::from(err)))
}

/// Encode a peer reply to request `id`. Nested intermediates are flattened away.
pub fn encode_response(id: &str, response: &FetchResponse) -> Vec<Frame> {
    let hops = response.intermediates.as_deref().unwrap_or_default();
    let meta = WireResponse {
        id: id.to_string(),
        url: response.url.clone(),
        status_code: response.status_code,
        headers: response.headers.clone(),
        body_length: response.body.len(),
        intermediates: response.intermediates.as_ref().map(|_| {
            hops.iter()
                .map(|hop| WireIntermediate {
                    url: hop.url.clone(),
                    status_code: hop.status_code,
                    headers: hop.headers.clone(),
                    body_length: hop.body.len(),
                })
                .collect()
        }),
    };

    let mut frames = Vec::with_capacity(2 + hops.len());
    frames.push(Frame::Text(serde_json::to_string(&meta).unwrap_or_default()));
    frames.push(Frame::Binary(response.body.clone()));
    frames.extend(hops.iter().map(|hop| Frame::Binary(hop.body.clone())));
    frames
}

/// Collects the binary frames announced by a metadata frame.
#[derive(Debug)]
struct PendingBodies<M> {
    meta: M,
    lengths: Vec<usize>,
    bodies: Vec<Vec<u8>>,
}

impl<M> PendingBodies<M> {
    fn new(meta: M, lengths: Vec<usize>) -> Self {
        let bodies = Vec::with_capacity(lengths.len());
        Self {
            meta,
            lengths,
            bodies,
        }
    }

    fn push(&mut self, body: Vec<u8>) -> Result<(), TunnelError> {
        let expected = self.lengths[self.bodies.len()];
        if body.len() != expected {
            return Err(violation(format!(
                "body frame has {} bytes, expected {}",
                body.len(),
                expected
            )));
        }
        self.bodies.push(body);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.bodies.len() == self.lengths.len()
    }
}

/// Reassembles the reply to one outstanding fetch request.
#[derive(Debug)]
pub struct ResponseAssembler {
    expected_id: String,
    max_body_bytes: usize,
    pending: Option<PendingBodies<WireResponse>>,
}

impl ResponseAssembler {
    pub fn new(expected_id: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            expected_id: expected_id.into(),
            max_body_bytes,
            pending: None,
        }
    }

    /// Feed one inbound frame. Returns the response once its last body arrives.
    pub fn feed(&mut self, frame: Frame) -> Result<Option<FetchResponse>, TunnelError> {
        match frame {
            Frame::Text(text) => {
                if self.pending.is_some() {
                    return Err(violation("metadata frame while body frames pending"));
                }
                let meta: WireResponse = serde_json::from_str(&text)
                    .map_err(|e| violation(format!("malformed reply: {}", e)))?;
                if meta.id != self.expected_id {
                    return Err(violation(format!(
                        "reply for '{}' while awaiting '{}'",
                        meta.id, self.expected_id
                    )));
                }
                let mut lengths = vec![meta.body_length];
                if let Some(hops) = &meta.intermediates {
                    lengths.extend(hops.iter().map(|hop| hop.body_length));
                }
                if let Some(len) = lengths.iter().find(|len| **len > self.max_body_bytes) {
                    return Err(violation(format!(
                        "body of {} bytes exceeds limit of {}",
                        len, self.max_body_bytes
                    )));
                }
                self.pending = Some(PendingBodies::new(meta, lengths));
                Ok(None)
            }
            Frame::Binary(body) => {
                let Some(pending) = self.pending.as_mut() else {
                    return Err(violation("body frame before reply metadata"));
                };
                pending.push(body)?;
                if !pending.is_complete() {
                    return Ok(None);
                }
                Ok(self
                    .pending
                    .take()
                    .map(|pending| build_response(pending.meta, pending.bodies)))
            }
        }
    }
}

fn build_response(meta: WireResponse, bodies: Vec<Vec<u8>>) -> FetchResponse {
    let mut bodies = bodies.into_iter();
    let body = bodies.next().unwrap_or_default();
    let intermediates = meta.intermediates.map(|hops| {
        hops.into_iter()
            .zip(bodies)
            .map(|(hop, body)| FetchResponse {
                url: hop.url,
                status_code: hop.status_code,
                headers: hop.headers,
                body,
                intermediates: None,
            })
            .collect()
    });
    FetchResponse {
        url: meta.url,
        status_code: meta.status_code,
        headers: meta.headers,
        body,
        intermediates,
    }
}

/// Something the peer received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Request(FetchRequest),
    Result(Vec<StreamVariant>),
    Error(ErrorPayload),
}

/// Peer-side decoder for server frames.
#[derive(Debug, Default)]
pub struct PeerDecoder {
    pending: Option<PendingBodies<WireRequest>>,
}

impl PeerDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, frame: Frame) -> Result<Option<PeerEvent>, TunnelError> {
        match frame {
            Frame::Text(text) => {
                if self.pending.is_some() {
                    return Err(violation("request body frame missing"));
                }
                let msg: ServerMessage = serde_json::from_str(&text)
                    .map_err(|e| violation(format!("malformed server message: {}", e)))?;
                match msg {
                    ServerMessage::UrlRequest(meta) => match meta.body_length {
                        Some(len) => {
                            self.pending = Some(PendingBodies::new(meta, vec![len]));
                            Ok(None)
                        }
                        None => Ok(Some(PeerEvent::Request(build_request(meta, None)))),
                    },
                    ServerMessage::Result(variants) => Ok(Some(PeerEvent::Result(variants))),
                    ServerMessage::Error(payload) => Ok(Some(PeerEvent::Error(payload))),
                }
            }
            Frame::Binary(body) => {
                let Some(mut pending) = self.pending.take() else {
                    return Err(violation("unexpected body frame"));
                };
                pending.push(body)?;
                let body = pending.bodies.into_iter().next();
                Ok(Some(PeerEvent::Request(build_request(pending.meta, body))))
            }
        }
    }
}

fn build_request(meta: WireRequest, body: Option<Vec<u8>>) -> FetchRequest {
    FetchRequest {
        id: meta.id,
        url: meta.url,
        method: meta.method,
        headers: meta.headers,
        body,
        allow_redirects: meta.allow_redirects,
        apply_cookies_on_redirect: meta.apply_cookies_on_redirect,
        save_intermediate_responses: meta.save_intermediate_responses,
    }
}
