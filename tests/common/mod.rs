//! Shared fixtures for the integration tests: a scripted in-process
//! transport, frame builders and an action recorder.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;

use chat_engine::frames::Frame;
use chat_engine::models::api::{
    ChunkChoice, ChunkDelta, CompletionChunk, CompletionCreateParams, FunctionDelta, ToolCallDelta,
};
use chat_engine::store::{Action as _, Subscription};
use chat_engine::{
    Action, ActionKind, Chat, Error, Result, Transport, TransportRequest, TransportResponse,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub const ALL_KINDS: &[ActionKind] = &[
    ActionKind::Init,
    ActionKind::SetMessages,
    ActionKind::SendMessage,
    ActionKind::ResendMessages,
    ActionKind::UpdateOptions,
    ActionKind::StopMessageGeneration,
    ActionKind::GenerateMessageStart,
    ActionKind::GenerateMessageChunk,
    ActionKind::GenerateMessageFinish,
    ActionKind::GenerateMessageSuccess,
    ActionKind::GenerateMessageError,
    ActionKind::GenerateMessageExhaustedRetries,
    ActionKind::ThreadLoadStart,
    ActionKind::ThreadLoadSuccess,
    ActionKind::ThreadLoadFailure,
    ActionKind::ThreadSaveStart,
    ActionKind::ThreadSaveSuccess,
    ActionKind::ThreadSaveFailure,
    ActionKind::AssistantTurnFinalized,
    ActionKind::Sizzle,
    ActionKind::RunToolCallsSuccess,
    ActionKind::RunToolCallsError,
];

/// What the transport does for one attempt.
pub enum Step {
    Reply(Vec<Frame>),
    Fail(Error),
    /// Never answers; the attempt only ends through cancellation.
    Hang,
    /// Streams `frames`, then holds the stream open until the attempt is
    /// cancelled and only then offers `late`.
    Stall { frames: Vec<Frame>, late: Vec<Frame> },
}

/// Transport that plays back one [`Step`] per attempt and records every
/// request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<TransportRequest>>,
    pub started: Notify,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().push_back(step);
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn params(&self) -> Vec<CompletionCreateParams> {
        self.requests().into_iter().map(|request| request.params).collect()
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let signal = request.signal.clone();
        self.requests.lock().push(request);
        self.started.notify_one();

        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Reply(frames)) => Ok(TransportResponse::from_frames(frames)),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Hang) => {
                signal.cancelled().await;
                Err(Error::Cancelled)
            }
            Some(Step::Stall { frames, late }) => {
                let held = stream::once(async move {
                    signal.cancelled().await;
                    stream::iter(late.into_iter().map(Ok::<Frame, Error>))
                })
                .flatten();
                let frames = stream::iter(frames.into_iter().map(Ok::<Frame, Error>)).chain(held);
                Ok(TransportResponse::frames(Box::pin(frames)))
            }
            None => Err(Error::other("script exhausted")),
        }
    }
}

pub fn chunk(delta: ChunkDelta) -> Frame {
    Frame::GenerationChunk {
        chunk: CompletionChunk {
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
        },
    }
}

/// A content chunk opening or continuing an assistant message.
pub fn text_chunk(text: &str) -> Frame {
    chunk(ChunkDelta {
        role: Some("assistant".into()),
        content: Some(text.into()),
        tool_calls: None,
    })
}

/// A complete turn answering with `text`, split in two chunks.
pub fn text_reply(text: &str) -> Vec<Frame> {
    let (head, tail) = text.split_at(text.len() / 2);
    vec![
        Frame::GenerationStart,
        chunk(ChunkDelta {
            role: Some("assistant".into()),
            content: Some(head.into()),
            tool_calls: None,
        }),
        chunk(ChunkDelta {
            content: Some(tail.into()),
            ..Default::default()
        }),
        Frame::GenerationFinish,
    ]
}

/// A complete turn that only calls tools, given as `(id, name, arguments)`.
pub fn tool_reply(calls: &[(&str, &str, &str)]) -> Vec<Frame> {
    let deltas = calls
        .iter()
        .enumerate()
        .map(|(index, (id, name, arguments))| ToolCallDelta {
            index: index as u32,
            id: Some((*id).into()),
            call_type: Some("function".into()),
            function: Some(FunctionDelta {
                name: Some((*name).into()),
                arguments: Some((*arguments).into()),
            }),
        })
        .collect();

    vec![
        Frame::GenerationStart,
        chunk(ChunkDelta {
            role: Some("assistant".into()),
            content: None,
            tool_calls: Some(deltas),
        }),
        Frame::GenerationFinish,
    ]
}

/// Collects every action a chat dispatches, in order.
pub struct Recorder {
    rx: mpsc::UnboundedReceiver<Action>,
    seen: Vec<Action>,
    subscription: Subscription,
}

impl Recorder {
    pub fn attach(chat: &Chat) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = chat.when(ALL_KINDS, move |action| {
            let _ = tx.send(action.clone());
        });
        Self {
            rx,
            seen: Vec::new(),
            subscription,
        }
    }

    /// Wait for the `nth` (1-based) action of `kind` counted from the start
    /// of the recording.
    pub async fn until_nth(&mut self, kind: ActionKind, nth: usize) -> Action {
        loop {
            let matching: Vec<&Action> = self.seen.iter().filter(|a| a.kind() == kind).collect();
            if let Some(action) = matching.get(nth - 1) {
                return (*action).clone();
            }
            let next = timeout(WAIT, self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {kind}; saw {:?}", self.kinds()))
                .expect("recorder channel closed");
            self.seen.push(next);
        }
    }

    pub async fn until(&mut self, kind: ActionKind) -> Action {
        self.until_nth(kind, 1).await
    }

    /// Pick up anything dispatched after a short quiet period.
    pub async fn settle(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        while let Ok(action) = self.rx.try_recv() {
            self.seen.push(action);
        }
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.seen.iter().map(|action| action.kind()).collect()
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.seen.iter().filter(|action| action.kind() == kind).count()
    }

    pub fn seen(&self) -> &[Action] {
        &self.seen
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
