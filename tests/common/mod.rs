//! Shared harness for tunnel integration tests.
//!
//! Starts a real server on an ephemeral port and drives it with a scripted
//! peer speaking the wire protocol over tokio-tungstenite.
#![allow(dead_code)]

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use fetch_tunnel::config::TunnelConfig;
use fetch_tunnel::extraction::{
    EngineError, EngineFactory, ExtractionEngine, RawInfo, Transport, TransportRequest,
};
use fetch_tunnel::protocol::codec::encode_response;
use fetch_tunnel::protocol::{FetchRequest, FetchResponse, Frame, JobId, PeerDecoder, PeerEvent};
use fetch_tunnel::{Shutdown, TunnelError, TunnelServer};

pub const JOB: &str = "dQw4w9WgXcQ";

/// Config tuned for tests: short deadlines, quick drain.
pub fn test_config() -> TunnelConfig {
    let mut config = TunnelConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.tunnel.fetch_timeout_ms = 2_000;
    config.workers.pool_size = 4;
    config.lifecycle.drain_timeout_secs = 2;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

pub async fn start_server(config: TunnelConfig, engine: Arc<dyn EngineFactory>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = TunnelServer::new(config, engine);
    let handle = tokio::spawn(server.run(listener, receiver));
    TestServer {
        addr,
        shutdown,
        handle,
    }
}

impl TestServer {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

type PeerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A peer whose every move is scripted by the test.
pub struct ScriptedPeer {
    socket: PeerSocket,
    decoder: PeerDecoder,
}

pub async fn try_connect(
    addr: SocketAddr,
    job: &str,
    user_agent: Option<&str>,
) -> Result<ScriptedPeer, tungstenite::Error> {
    let mut request = format!("ws://{}/v1?videoID={}", addr, job).into_client_request()?;
    if let Some(agent) = user_agent {
        request
            .headers_mut()
            .insert(header::USER_AGENT, HeaderValue::from_str(agent).unwrap());
    }
    let (socket, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(ScriptedPeer {
        socket,
        decoder: PeerDecoder::new(),
    })
}

pub async fn connect(addr: SocketAddr) -> ScriptedPeer {
    try_connect(addr, JOB, Some("scripted-peer/1.0")).await.unwrap()
}

impl ScriptedPeer {
    /// Next decoded server event; `None` once the server closes.
    pub async fn next_event(&mut self) -> Option<PeerEvent> {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), self.socket.next())
                .await
                .expect("server went silent")?;
            let frame = match message {
                Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(bytes)) => Frame::Binary(bytes.to_vec()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            };
            if let Some(event) = self.decoder.feed(frame).expect("malformed server frames") {
                return Some(event);
            }
        }
    }

    pub async fn expect_request(&mut self) -> FetchRequest {
        match self.next_event().await {
            Some(PeerEvent::Request(request)) => request,
            other => panic!("expected urlRequest, got {:?}", other),
        }
    }

    pub async fn reply(&mut self, id: &str, response: &FetchResponse) {
        for frame in encode_response(id, response) {
            self.send_frame(frame).await;
        }
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.socket.send(message).await.unwrap();
    }

    /// Drop the TCP connection without a close handshake.
    pub fn disconnect(self) {
        drop(self.socket);
    }
}

pub fn ok_response(url: &str, body: impl Into<Vec<u8>>) -> FetchResponse {
    FetchResponse {
        url: url.to_string(),
        status_code: Some(200),
        body: body.into(),
        ..Default::default()
    }
}

/// Engine that fetches one JSON document and reports it as its result.
pub struct JsonEngine {
    transport: Arc<dyn Transport>,
    errors: Option<mpsc::UnboundedSender<TunnelError>>,
}

impl ExtractionEngine for JsonEngine {
    fn extract(&self, job: &JobId) -> Result<Option<RawInfo>, EngineError> {
        let request = TransportRequest::get(format!("https://media.example/info/{}", job));
        let mut response = match self.transport.fetch(request) {
            Ok(response) => response,
            Err(err) => {
                if let Some(errors) = &self.errors {
                    let _ = errors.send(err.clone());
                }
                return Err(err.into());
            }
        };
        let mut body = Vec::new();
        response.read_to_end(&mut body)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

pub fn json_engine() -> Arc<dyn EngineFactory> {
    Arc::new(|transport: Arc<dyn Transport>| {
        Box::new(JsonEngine {
            transport,
            errors: None,
        }) as Box<dyn ExtractionEngine>
    })
}

/// Like [`json_engine`], but reports the fetch error the worker saw.
pub fn probed_json_engine() -> (Arc<dyn EngineFactory>, mpsc::UnboundedReceiver<TunnelError>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let factory: Arc<dyn EngineFactory> = Arc::new(move |transport: Arc<dyn Transport>| {
        Box::new(JsonEngine {
            transport,
            errors: Some(tx.clone()),
        }) as Box<dyn ExtractionEngine>
    });
    (factory, rx)
}

/// Engine that posts a binary body, then fetches the info document.
pub struct TwoStepEngine {
    transport: Arc<dyn Transport>,
}

pub const UPLOAD: [u8; 4] = [0x00, 0x9f, 0xff, 0x0a];

impl ExtractionEngine for TwoStepEngine {
    fn extract(&self, job: &JobId) -> Result<Option<RawInfo>, EngineError> {
        let mut echo = self.transport.fetch(
            TransportRequest::new("POST", "https://media.example/upload")
                .header("User-Agent", "engine-agent")
                .body(UPLOAD.to_vec()),
        )?;
        let mut echoed = Vec::new();
        echo.read_to_end(&mut echoed)?;
        if echoed != UPLOAD {
            return Err(EngineError::Parse("echo mismatch".into()));
        }

        let mut info = self
            .transport
            .fetch(TransportRequest::get(format!("https://media.example/info/{}", job)))?;
        let mut body = Vec::new();
        info.read_to_end(&mut body)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

pub fn two_step_engine() -> Arc<dyn EngineFactory> {
    Arc::new(|transport: Arc<dyn Transport>| {
        Box::new(TwoStepEngine { transport }) as Box<dyn ExtractionEngine>
    })
}

/// Engine that never touches the network.
pub fn static_engine(info: &'static str) -> Arc<dyn EngineFactory> {
    Arc::new(move |_transport: Arc<dyn Transport>| {
        Box::new(StaticEngine(info)) as Box<dyn ExtractionEngine>
    })
}

struct StaticEngine(&'static str);

impl ExtractionEngine for StaticEngine {
    fn extract(&self, _job: &JobId) -> Result<Option<RawInfo>, EngineError> {
        Ok(serde_json::from_str(self.0)?)
    }
}

/// One usable format and one storyboard.
pub const INFO_JSON: &str = r#"{"formats":[
    {"format_id":"18","url":"https://v/18","ext":"mp4","vcodec":"avc1","acodec":"none","tbr":1234.5},
    {"format_id":"sb0","url":"https://v/sb0","vcodec":"none","acodec":"none"}
]}"#;

/// Engine that pauses around its single info fetch.
pub struct SlowEngine {
    transport: Arc<dyn Transport>,
    before: Duration,
    after: Duration,
}

impl ExtractionEngine for SlowEngine {
    fn extract(&self, job: &JobId) -> Result<Option<RawInfo>, EngineError> {
        std::thread::sleep(self.before);
        let mut info = self
            .transport
            .fetch(TransportRequest::get(format!("https://media.example/info/{}", job)))?;
        let mut body = Vec::new();
        info.read_to_end(&mut body)?;
        std::thread::sleep(self.after);
        Ok(serde_json::from_slice(&body)?)
    }
}

pub fn slow_engine(before: Duration, after: Duration) -> Arc<dyn EngineFactory> {
    Arc::new(move |transport: Arc<dyn Transport>| {
        Box::new(SlowEngine {
            transport,
            before,
            after,
        }) as Box<dyn ExtractionEngine>
    })
}
