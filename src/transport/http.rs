//! HTTP transport: POSTs the completion params as JSON and streams the body.

use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{Transport, TransportRequest, TransportResponse};
use crate::frames::{ByteStream, sse_frames};
use crate::middleware::{HttpRequest, Middleware, apply_all};
use crate::{Error, Result, TransportError};

/// Longest excerpt of an error body kept in a [`TransportError`] message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// How the response body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// 4-byte length-prefixed JSON frames.
    #[default]
    Frames,
    /// OpenAI-style Server-Sent Events carrying completion chunks.
    Sse,
}

/// Sends requests to a single HTTP endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    url: String,
    middleware: Vec<Arc<dyn Middleware>>,
    wire_format: WireFormat,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            middleware: Vec::new(),
            wire_format: WireFormat::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_middleware(mut self, middleware: Vec<Arc<dyn Middleware>>) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    /// Use a preconfigured client, e.g. one with a timeout or proxy.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("middleware", &self.middleware.len())
            .field("wire_format", &self.wire_format)
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(url = %self.url, attempt = request.attempt, request_id = %request.request_id))]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        if self.url.is_empty() {
            return Err(TransportError::fatal("Missing base URL for HttpTransport").into());
        }

        let outgoing = HttpRequest {
            url: self.url.clone(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(&request.params)?,
        };
        let outgoing = apply_all(&self.middleware, outgoing).await?;

        let mut builder = self.client.post(&outgoing.url).body(outgoing.body);
        for (name, value) in outgoing.headers {
            builder = builder.header(name, value);
        }

        let response = tokio::select! {
            biased;
            _ = request.signal.cancelled() => return Err(Error::Cancelled),
            response = builder.send() => response.map_err(Error::Http)?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!(
                "{} ({}): {}",
                status.canonical_reason().unwrap_or("Unknown Status"),
                status.as_u16(),
                excerpt(&body)
            );
            debug!(status = status.as_u16(), "request rejected");
            return Err(TransportError::fatal(message)
                .with_status(status.as_u16())
                .into());
        }

        let bytes: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()).map_err(Error::Http)),
        );

        Ok(match self.wire_format {
            WireFormat::Frames => TransportResponse::stream(bytes),
            WireFormat::Sse => TransportResponse::frames(sse_frames(bytes)),
        })
    }
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut short: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    short.push('…');
    short
}
