//! Real network transport used for passthrough and recording

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::{RecorderError, Result};

/// Sends a request over the network and returns the fully read response
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Forward `request`
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or the body cannot be read
    async fn send(&self, request: hyper::Request<Bytes>) -> Result<hyper::Response<Bytes>>;
}

/// Plain HTTP transport on the hyper-util pooled client
#[derive(Debug, Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    /// Create a new transport
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: hyper::Request<Bytes>) -> Result<hyper::Response<Bytes>> {
        debug!("Forwarding {} {}", request.method(), request.uri());

        let (parts, body) = request.into_parts();
        let request = hyper::Request::from_parts(parts, Full::new(body));

        let response = self.client.request(request).await.map_err(|e| {
            warn!("Request failed: {e}");
            RecorderError::Transport(format!("Request failed: {e}"))
        })?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| RecorderError::Transport(format!("Failed to read response body: {e}")))?
            .to_bytes();

        Ok(hyper::Response::from_parts(parts, body))
    }
}
