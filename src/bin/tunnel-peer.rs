//! Reference peer: connects to a tunnel server and performs its fetches.

use std::collections::HashMap;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use reqwest::{redirect, Client, Method};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use fetch_tunnel::protocol::codec::encode_response;
use fetch_tunnel::protocol::{FetchRequest, FetchResponse, Frame, PeerDecoder, PeerEvent};

const MAX_REDIRECTS: usize = 10;

#[derive(Parser)]
#[command(name = "tunnel-peer")]
#[command(about = "Answers a tunnel server's fetch requests from this machine", long_about = None)]
struct Cli {
    /// Server base URL.
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Job to extract.
    #[arg(short, long)]
    video_id: String,

    /// User-Agent announced on the connection.
    #[arg(short, long)]
    user_agent: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let endpoint = format!("{}/v1?videoID={}", cli.server.trim_end_matches('/'), cli.video_id);

    let mut request = endpoint.as_str().into_client_request()?;
    if let Some(agent) = &cli.user_agent {
        request
            .headers_mut()
            .insert(header::USER_AGENT, HeaderValue::from_str(agent)?);
    }

    let socket = match tokio_tungstenite::connect_async(request).await {
        Ok((socket, _)) => socket,
        Err(tungstenite::Error::Http(response)) => {
            let body = response
                .body()
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            eprintln!("Rejected with {}: {}", response.status(), body);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    // Redirects are followed by hand so hops can be reported.
    let client = Client::builder().redirect(redirect::Policy::none()).build()?;
    let (mut sink, mut stream) = socket.split();
    let mut decoder = PeerDecoder::new();

    while let Some(message) = stream.next().await {
        let frame = match message? {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            Message::Close(_) => break,
            _ => continue,
        };

        match decoder.feed(frame)? {
            None => {}
            Some(PeerEvent::Request(request)) => {
                let id = request.id.clone();
                eprintln!("→ {} {}", request.method, request.url);
                let response = perform(&client, request).await;
                for frame in encode_response(&id, &response) {
                    sink.send(to_message(frame)).await?;
                }
            }
            Some(PeerEvent::Result(variants)) => {
                println!("{}", serde_json::to_string_pretty(&variants)?);
            }
            Some(PeerEvent::Error(payload)) => {
                println!("{}", serde_json::to_string_pretty(&payload)?);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// Perform one fetch. Network failures become a reply without a status.
async fn perform(client: &Client, request: FetchRequest) -> FetchResponse {
    let original_url = request.url.clone();
    match follow(client, request).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("  fetch failed: {}", e);
            FetchResponse {
                url: original_url,
                ..Default::default()
            }
        }
    }
}

async fn follow(client: &Client, request: FetchRequest) -> Result<FetchResponse, Box<dyn std::error::Error>> {
    let mut method = Method::from_bytes(request.method.as_bytes())?;
    let mut url = Url::parse(&request.url)?;
    let mut headers = request.headers;
    let mut body = request.body;
    let mut hops = Vec::new();

    loop {
        let mut builder = client.request(method.clone(), url.clone());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await?;

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_owned))
            .collect();
        let current = FetchResponse {
            url: response.url().to_string(),
            status_code: Some(status.as_u16()),
            headers: flatten_headers(response.headers()),
            body: response.bytes().await?.to_vec(),
            intermediates: None,
        };

        let next = match location {
            Some(location) if request.allow_redirects && status.is_redirection() => {
                Some(url.join(&location)?)
            }
            _ => None,
        };
        let Some(next) = next else {
            return Ok(FetchResponse {
                intermediates: request.save_intermediate_responses.then_some(hops),
                ..current
            });
        };
        if hops.len() >= MAX_REDIRECTS {
            return Err(format!("more than {} redirects", MAX_REDIRECTS).into());
        }

        if redirect_drops_body(status.as_u16(), &method) {
            method = Method::GET;
            body = None;
            headers.retain(|name, _| {
                !name.eq_ignore_ascii_case("content-type") && !name.eq_ignore_ascii_case("content-length")
            });
        }
        if request.apply_cookies_on_redirect && !set_cookies.is_empty() {
            merge_cookies(&mut headers, &set_cookies);
        }

        hops.push(current);
        url = next;
    }
}

/// 303 always, and 301/302 for POST, turn into a bodiless GET.
fn redirect_drops_body(status: u16, method: &Method) -> bool {
    status == 303 || (matches!(status, 301 | 302) && *method == Method::POST)
}

/// Append `name=value` pairs from Set-Cookie lines to the Cookie header.
fn merge_cookies(headers: &mut HashMap<String, String>, set_cookies: &[String]) {
    let key = headers
        .keys()
        .find(|k| k.eq_ignore_ascii_case("cookie"))
        .cloned()
        .unwrap_or_else(|| "Cookie".to_string());
    let mut pairs: Vec<String> = headers
        .get(&key)
        .map(|existing| {
            existing
                .split(';')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    for line in set_cookies {
        let Some(pair) = line.split(';').next().map(str::trim) else {
            continue;
        };
        let Some((name, _)) = pair.split_once('=') else {
            continue;
        };
        pairs.retain(|p| p.split_once('=').map(|(n, _)| n) != Some(name));
        pairs.push(pair.to_string());
    }
    headers.insert(key, pairs.join("; "));
}

fn flatten_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}
