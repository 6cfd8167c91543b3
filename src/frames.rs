//! Frames: the decoded units of a streamed generation response.
//!
//! On the wire each frame is a 4-byte big-endian length followed by that many
//! bytes of UTF-8 JSON:
//!
//! ```text
//! +----------------+-------------------------------------------+
//! | len: u32 (BE)  | {"type":"generation-chunk","chunk":{...}} |
//! +----------------+-------------------------------------------+
//! ```
//!
//! Transports that speak OpenAI-style Server-Sent Events instead are adapted
//! by [`sse_frames`], which synthesizes the generation lifecycle around the
//! `data:` chunks.

use eventsource_stream::Eventsource;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;

use crate::models::api::{CompletionChunk, Message};
use crate::{Error, Result};

/// Bytes as delivered by a transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Decoded frames, in arrival order.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

const LENGTH_PREFIX: usize = 4;

/// Largest frame body the decoder accepts by default (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One event of the generation protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    ThreadLoadStart,
    ThreadLoadSuccess {
        #[serde(default)]
        thread: Vec<Message>,
    },
    ThreadLoadFailure {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stacktrace: Option<String>,
    },
    GenerationStart,
    GenerationChunk {
        #[serde(alias = "delta")]
        chunk: CompletionChunk,
    },
    GenerationError {
        error: String,
    },
    GenerationFinish,
    ThreadSaveStart,
    ThreadSaveSuccess {
        #[serde(rename = "threadId", alias = "thread_id")]
        thread_id: String,
    },
    ThreadSaveFailure {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stacktrace: Option<String>,
    },
}

/// Serialize one frame with its length prefix.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(frame)?;
    let len = u32::try_from(json.len())
        .map_err(|_| Error::stream(format!("frame of {} bytes is too large", json.len())))?;

    let mut out = Vec::with_capacity(LENGTH_PREFIX + json.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&json);
    Ok(out)
}

/// Incremental decoder for length-prefixed frames.
///
/// Chunks may split a frame anywhere, including inside the length prefix.
/// A prefix announcing more than `max_frame_len` bytes fails right away
/// instead of buffering the body.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Append `bytes` and return every frame that is now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut offset = 0;
        while self.buffer.len() - offset >= LENGTH_PREFIX {
            let mut prefix = [0u8; LENGTH_PREFIX];
            prefix.copy_from_slice(&self.buffer[offset..offset + LENGTH_PREFIX]);
            let len = u32::from_be_bytes(prefix) as usize;
            if len > self.max_frame_len {
                return Err(Error::stream(format!(
                    "frame of {len} bytes exceeds the {} byte limit",
                    self.max_frame_len
                )));
            }

            let start = offset + LENGTH_PREFIX;
            if self.buffer.len() - start < len {
                break;
            }
            frames.push(serde_json::from_slice(&self.buffer[start..start + len])?);
            offset = start + len;
        }

        self.buffer.drain(..offset);
        Ok(frames)
    }

    /// Fail if the stream ended in the middle of a frame.
    pub fn finish(&self) -> Result<()> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(Error::stream(format!(
                "stream ended with {} bytes of an incomplete frame",
                self.buffer.len()
            )))
        }
    }
}

struct DecodeState {
    bytes: ByteStream,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
    done: bool,
}

/// Decode a byte stream of length-prefixed frames.
///
/// The first error ends the stream.
pub fn decode_frames(bytes: ByteStream) -> FrameStream {
    let state = DecodeState {
        bytes,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.ready.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.decoder.push(&chunk) {
                    Ok(frames) => state.ready.extend(frames),
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    if let Err(e) = state.decoder.finish() {
                        return Some((Err(e), state));
                    }
                }
            }
        }
    }))
}

/// Adapt an OpenAI-style SSE body into frames.
///
/// Emits `generation-start`, one `generation-chunk` per `data:` event and a
/// closing `generation-finish`. A `[DONE]` sentinel ends the chunks; a body
/// that simply ends is treated the same way.
pub fn sse_frames(bytes: ByteStream) -> FrameStream {
    let chunks = bytes
        .eventsource()
        .take_while(|event| {
            let more = !matches!(event, Ok(event) if event.data.trim() == "[DONE]");
            async move { more }
        })
        .filter_map(|event| async move {
            match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => Some(
                    serde_json::from_str::<CompletionChunk>(&event.data)
                        .map(|chunk| Frame::GenerationChunk { chunk })
                        .map_err(|e| Error::stream(format!("invalid SSE chunk: {e}"))),
                ),
                Err(e) => Some(Err(Error::stream(e.to_string()))),
            }
        });

    Box::pin(
        stream::once(async { Ok(Frame::GenerationStart) })
            .chain(chunks)
            .chain(stream::once(async { Ok(Frame::GenerationFinish) })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunks(parts: Vec<Vec<u8>>) -> ByteStream {
        Box::pin(stream::iter(parts.into_iter().map(Ok)))
    }

    #[test]
    fn test_frame_wire_names() {
        assert_eq!(
            serde_json::to_value(Frame::ThreadSaveSuccess {
                thread_id: "t1".into()
            })
            .unwrap(),
            json!({"type": "thread-save-success", "threadId": "t1"})
        );

        let frame: Frame = serde_json::from_value(json!({
            "type": "generation-chunk",
            "delta": {"choices": []}
        }))
        .unwrap();
        assert!(matches!(frame, Frame::GenerationChunk { .. }));
    }

    #[test]
    fn test_oversized_prefix_fails_without_buffering() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.push(&[0xFF, 0xFF, 0xFF, 0xF0, b'{']).unwrap_err();
        assert!(matches!(err, Error::Stream(ref message) if message.contains("exceeds")));

        let frame = encode_frame(&Frame::GenerationStart).unwrap();
        let mut small = FrameDecoder::new().with_max_frame_len(4);
        assert!(small.push(&frame).is_err());
        let mut roomy = FrameDecoder::new().with_max_frame_len(frame.len());
        assert_eq!(roomy.push(&frame).unwrap(), vec![Frame::GenerationStart]);
    }

    #[tokio::test]
    async fn test_decode_split_frames() {
        let mut bytes = encode_frame(&Frame::GenerationStart).unwrap();
        bytes.extend(encode_frame(&Frame::GenerationError { error: "boom".into() }).unwrap());
        bytes.extend(encode_frame(&Frame::GenerationFinish).unwrap());

        // split inside the first length prefix and inside payloads
        let parts = vec![
            bytes[..2].to_vec(),
            bytes[2..30].to_vec(),
            bytes[30..bytes.len() - 3].to_vec(),
            bytes[bytes.len() - 3..].to_vec(),
        ];

        let frames: Vec<Frame> = decode_frames(chunks(parts))
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(
            frames,
            vec![
                Frame::GenerationStart,
                Frame::GenerationError { error: "boom".into() },
                Frame::GenerationFinish,
            ]
        );
    }

    #[tokio::test]
    async fn test_truncated_tail_is_an_error() {
        let bytes = encode_frame(&Frame::GenerationStart).unwrap();
        let truncated = bytes[..bytes.len() - 1].to_vec();

        let results: Vec<Result<Frame>> = decode_frames(chunks(vec![truncated])).collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Stream(_))));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error() {
        let mut bytes = 5u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"nope!");

        let results: Vec<Result<Frame>> = decode_frames(chunks(vec![bytes])).collect().await;
        assert!(matches!(results[0], Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_sse_frames() {
        let body = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"!\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        let frames: Vec<Frame> = sse_frames(chunks(vec![body.as_bytes().to_vec()]))
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], Frame::GenerationStart);
        assert!(matches!(frames[1], Frame::GenerationChunk { .. }));
        assert_eq!(frames[3], Frame::GenerationFinish);
    }
}
