//! Transports carry a completion request to a model and return its frames.
//!
//! A transport answers with either decoded [`Frame`]s or raw length-prefixed
//! bytes; [`TransportResponse::into_frames`] normalizes both into one
//! [`FrameStream`]. Resources held by a response are released by its
//! [`Disposer`] when the generation loop is done with it, on every exit path.

mod http;
mod resolver;

pub use http::{HttpTransport, WireFormat};
pub use resolver::{
    DetectionResult, Detector, ModelCandidate, ModelCapabilities, ModelInput, ModelResolver,
    ModelSelectionMetadata, ModelSpec, ModelSpecFactory, RequestedFeatures, ResolvedModel,
    ResolverConfig, SkipReason, SkippedSpec,
};

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::frames::{ByteStream, Frame, FrameStream, decode_frames};
use crate::models::api::CompletionCreateParams;

/// Everything a transport needs for one attempt.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub params: CompletionCreateParams,
    /// Fires when the attempt is aborted by stop, supersession or teardown.
    pub signal: CancellationToken,
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub request_id: String,
}

/// Body of a transport response.
pub enum ResponseBody {
    Frames(FrameStream),
    Stream(ByteStream),
}

/// What a transport hands back for one attempt.
pub struct TransportResponse {
    pub body: ResponseBody,
    pub metadata: Option<Value>,
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl TransportResponse {
    /// A response that already yields decoded frames.
    pub fn frames(frames: FrameStream) -> Self {
        Self {
            body: ResponseBody::Frames(frames),
            metadata: None,
            dispose: None,
        }
    }

    /// A response of length-prefixed frame bytes.
    pub fn stream(bytes: ByteStream) -> Self {
        Self {
            body: ResponseBody::Stream(bytes),
            metadata: None,
            dispose: None,
        }
    }

    /// Convenience for tests and in-process transports.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self::frames(Box::pin(futures::stream::iter(frames.into_iter().map(Ok))))
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Run `dispose` once the generation loop releases this response.
    pub fn on_dispose(mut self, dispose: impl FnOnce() + Send + 'static) -> Self {
        self.dispose = Some(Box::new(dispose));
        self
    }

    /// Split into one frame stream and the guard that releases resources.
    pub fn into_frames(self) -> (FrameStream, Disposer) {
        let frames = match self.body {
            ResponseBody::Frames(frames) => frames,
            ResponseBody::Stream(bytes) => decode_frames(bytes),
        };
        (frames, Disposer(self.dispose))
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match self.body {
            ResponseBody::Frames(_) => "frames",
            ResponseBody::Stream(_) => "stream",
        };
        f.debug_struct("TransportResponse")
            .field("body", &body)
            .field("metadata", &self.metadata)
            .field("dispose", &self.dispose.is_some())
            .finish()
    }
}

/// Runs a response's dispose callback when dropped.
pub struct Disposer(Option<Box<dyn FnOnce() + Send>>);

impl Drop for Disposer {
    fn drop(&mut self) {
        if let Some(dispose) = self.0.take() {
            dispose();
        }
    }
}

/// Sends one attempt of a completion request.
///
/// Implementations should stop work promptly once `request.signal` fires and
/// report failures as [`crate::TransportError`] so the generation loop can
/// decide between retrying, falling back and giving up.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::encode_frame;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_stream_body_is_decoded() {
        let mut bytes = encode_frame(&Frame::GenerationStart).unwrap();
        bytes.extend(encode_frame(&Frame::GenerationFinish).unwrap());
        let body: ByteStream = Box::pin(futures::stream::iter(vec![Ok(bytes)]));

        let (frames, _dispose) = TransportResponse::stream(body).into_frames();
        let frames: Vec<Frame> = frames.map(|f| f.unwrap()).collect().await;
        assert_eq!(frames, vec![Frame::GenerationStart, Frame::GenerationFinish]);
    }

    #[test]
    fn test_dispose_runs_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let response = TransportResponse::from_frames(vec![]).on_dispose(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (frames, dispose) = response.into_frames();
        drop(frames);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(dispose);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
