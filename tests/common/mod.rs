//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use reel::transport::Transport;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-process stand-in for the real endpoint
///
/// * `/binary` returns 256 bytes of `application/octet-stream`
/// * `/status?code=N` returns status N
/// * `/redirect` returns a 302 with a `Location` header
/// * anything else echoes method, path, query, body and the call number as JSON
#[derive(Debug, Default)]
pub struct EchoTransport {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl EchoTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for EchoTransport {
    async fn send(&self, request: hyper::Request<Bytes>) -> reel::Result<hyper::Response<Bytes>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let query = request.uri().query().unwrap_or_default().to_string();
        let response = match request.uri().path() {
            "/binary" => {
                let content: Vec<u8> = (0..=255u8).collect();
                hyper::Response::builder()
                    .header("Content-Type", "application/octet-stream")
                    .header("Content-Length", content.len())
                    .body(Bytes::from(content))
            }
            "/status" => {
                let code = query
                    .strip_prefix("code=")
                    .and_then(|c| c.parse::<u16>().ok())
                    .unwrap_or(200);
                hyper::Response::builder().status(code).body(Bytes::new())
            }
            "/redirect" => hyper::Response::builder()
                .status(302)
                .header("Location", "http://example.test/json")
                .body(Bytes::new()),
            path => {
                let body = serde_json::json!({
                    "method": request.method().as_str(),
                    "path": path,
                    "query": query,
                    "body": String::from_utf8_lossy(request.body()),
                    "call": call,
                });
                let content = serde_json::to_vec(&body).unwrap();
                hyper::Response::builder()
                    .header("Content-Type", "application/json; charset=utf-8")
                    .header("Content-Length", content.len())
                    .body(Bytes::from(content))
            }
        };

        Ok(response.unwrap())
    }
}

/// GET request for `path_and_query` on the fake host
pub fn get(path_and_query: &str) -> hyper::Request<Bytes> {
    hyper::Request::builder()
        .uri(format!("http://example.test{path_and_query}"))
        .body(Bytes::new())
        .unwrap()
}

/// POST request with a JSON body
pub fn post_json(path: &str, body: &str) -> hyper::Request<Bytes> {
    hyper::Request::builder()
        .method("POST")
        .uri(format!("http://example.test{path}"))
        .header("Content-Type", "application/json")
        .body(Bytes::from(body.to_string()))
        .unwrap()
}

/// Parse a JSON response body
pub fn json(response: &hyper::Response<Bytes>) -> serde_json::Value {
    serde_json::from_slice(response.body()).unwrap()
}
