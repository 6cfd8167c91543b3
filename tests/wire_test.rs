//! Byte-level response handling
//!
//! Transports that hand back raw length-prefixed bytes or an SSE body go
//! through the same generation loop as frame transports.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_test::assert_ok;

use chat_engine::frames::{ByteStream, Frame, encode_frame, sse_frames};
use chat_engine::models::api::{ChunkChoice, ChunkDelta, CompletionChunk};
use chat_engine::models::view;
use chat_engine::{
    ActionKind, Chat, ChatOptions, Error, ModelSpec, Result, Transport, TransportRequest,
    TransportResponse,
};

/// Replies with pre-split byte bodies and counts disposals.
struct ByteTransport {
    bodies: Mutex<VecDeque<Vec<Vec<u8>>>>,
    disposed: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for ByteTransport {
    async fn send(&self, _request: TransportRequest) -> Result<TransportResponse> {
        let parts = self
            .bodies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::other("no body left"))?;
        let body: ByteStream = Box::pin(tokio_stream::iter(parts.into_iter().map(Ok)));
        let disposed = self.disposed.clone();
        Ok(TransportResponse::stream(body).on_dispose(move || {
            disposed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

fn text_chunk(text: &str) -> Frame {
    Frame::GenerationChunk {
        chunk: CompletionChunk {
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some("assistant".into()),
                    content: Some(text.into()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
        },
    }
}

fn encoded(frames: &[Frame]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for frame in frames {
        bytes.extend(assert_ok!(encode_frame(frame)));
    }
    bytes
}

/// Cut `bytes` into pieces of `size` bytes.
fn split(bytes: Vec<u8>, size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(size).map(<[u8]>::to_vec).collect()
}

#[tokio::test]
async fn test_length_prefixed_body_drives_a_turn() {
    let body = encoded(&[Frame::GenerationStart, text_chunk("From bytes"), Frame::GenerationFinish]);
    let disposed = Arc::new(AtomicUsize::new(0));
    let transport = Arc::new(ByteTransport {
        bodies: Mutex::new(VecDeque::from(vec![split(body, 7)])),
        disposed: disposed.clone(),
    });

    let options = ChatOptions::builder()
        .model(ModelSpec::new("bytes", transport))
        .debounce(Duration::ZERO)
        .build()
        .unwrap();
    let chat = Chat::new(options).unwrap();

    chat.send("Hi");
    chat.wait_for(&[ActionKind::AssistantTurnFinalized]).await;

    assert_eq!(chat.last_assistant_message(), Some(view::Message::assistant("From bytes")));
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_truncated_body_is_retried() {
    let full = encoded(&[Frame::GenerationStart, text_chunk("Complete"), Frame::GenerationFinish]);
    let mut truncated = encoded(&[Frame::GenerationStart, text_chunk("Cut")]);
    truncated.extend_from_slice(&full[..3]);

    let disposed = Arc::new(AtomicUsize::new(0));
    let transport = Arc::new(ByteTransport {
        bodies: Mutex::new(VecDeque::from(vec![vec![truncated], vec![full]])),
        disposed: disposed.clone(),
    });

    let options = ChatOptions::builder()
        .model(ModelSpec::new("bytes", transport))
        .debounce(Duration::ZERO)
        .retries(1)
        .build()
        .unwrap();
    let chat = Chat::new(options).unwrap();

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();
    let _errors = chat.when(&[ActionKind::GenerateMessageError], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    chat.send("Hi");
    chat.wait_for(&[ActionKind::AssistantTurnFinalized]).await;

    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
    assert_eq!(chat.last_assistant_message(), Some(view::Message::assistant("Complete")));
}

#[tokio::test]
async fn test_sse_body_is_wrapped_in_generation_lifecycle() {
    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let bytes: ByteStream = Box::pin(tokio_stream::iter(split(body.as_bytes().to_vec(), 16).into_iter().map(Ok)));

    let frames: Vec<Frame> = sse_frames(bytes).map(|frame| frame.unwrap()).collect().await;

    assert_eq!(frames.len(), 4);
    assert_eq!(frames.first(), Some(&Frame::GenerationStart));
    assert_eq!(frames.last(), Some(&Frame::GenerationFinish));
    assert!(matches!(frames[1], Frame::GenerationChunk { .. }));
}
