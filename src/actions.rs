//! Actions dispatched into the chat store.
//!
//! Actions are grouped by who produces them:
//!
//! - [`DevAction`]: the embedding application (send, stop, update options)
//! - [`ApiAction`]: the generation effect, one per observed frame or outcome
//! - [`InternalAction`]: bootstrap and the tool-execution effect
//!
//! Listeners and reducers route on [`ActionKind`], a fieldless mirror of the
//! variants whose [`ActionKind::name`] is the namespaced `"[group] event"`
//! string used in logs.

use std::fmt;
use std::sync::Arc;

use crate::Error;
use crate::models::{api, internal, view};
use crate::options::OptionsUpdate;
use crate::reducers::ConfigState;
use crate::store;
use crate::tools::Tool;

/// Everything the store is initialized from.
#[derive(Debug, Clone)]
pub struct InitPayload {
    pub config: ConfigState,
    pub tools: Vec<Tool>,
    pub messages: Vec<view::Message>,
}

#[derive(Debug, Clone)]
pub enum DevAction {
    Init(Arc<InitPayload>),
    SetMessages(Vec<view::Message>),
    SendMessage(view::Message),
    ResendMessages,
    UpdateOptions(Arc<OptionsUpdate>),
    StopMessageGeneration,
}

/// A finished assistant message and the tool calls it requested.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMessage {
    pub message: api::AssistantMessage,
    pub tool_calls: Vec<internal::ToolCall>,
}

/// A failure reported by the backend for thread persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    pub error: String,
    pub stacktrace: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ApiAction {
    GenerateMessageStart,
    /// The merged assistant message so far.
    GenerateMessageChunk(api::AssistantMessage),
    GenerateMessageFinish,
    GenerateMessageSuccess(GeneratedMessage),
    GenerateMessageError(Arc<Error>),
    GenerateMessageExhaustedRetries,
    ThreadLoadStart,
    ThreadLoadSuccess { thread: Vec<api::Message> },
    ThreadLoadFailure(RemoteFailure),
    ThreadSaveStart,
    ThreadSaveSuccess { thread_id: String },
    ThreadSaveFailure(RemoteFailure),
    AssistantTurnFinalized,
}

#[derive(Debug, Clone)]
pub enum InternalAction {
    /// Bootstrap trigger dispatched right after init.
    Sizzle,
    RunToolCallsSuccess { tool_messages: Vec<api::ToolMessage> },
    RunToolCallsError(Arc<Error>),
}

#[derive(Debug, Clone)]
pub enum Action {
    Dev(DevAction),
    Api(ApiAction),
    Internal(InternalAction),
}

impl From<DevAction> for Action {
    fn from(action: DevAction) -> Self {
        Action::Dev(action)
    }
}

impl From<ApiAction> for Action {
    fn from(action: ApiAction) -> Self {
        Action::Api(action)
    }
}

impl From<InternalAction> for Action {
    fn from(action: InternalAction) -> Self {
        Action::Internal(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Init,
    SetMessages,
    SendMessage,
    ResendMessages,
    UpdateOptions,
    StopMessageGeneration,
    GenerateMessageStart,
    GenerateMessageChunk,
    GenerateMessageFinish,
    GenerateMessageSuccess,
    GenerateMessageError,
    GenerateMessageExhaustedRetries,
    ThreadLoadStart,
    ThreadLoadSuccess,
    ThreadLoadFailure,
    ThreadSaveStart,
    ThreadSaveSuccess,
    ThreadSaveFailure,
    AssistantTurnFinalized,
    Sizzle,
    RunToolCallsSuccess,
    RunToolCallsError,
}

impl ActionKind {
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Init => "[dev] init",
            ActionKind::SetMessages => "[dev] setMessages",
            ActionKind::SendMessage => "[dev] sendMessage",
            ActionKind::ResendMessages => "[dev] resendMessages",
            ActionKind::UpdateOptions => "[dev] updateOptions",
            ActionKind::StopMessageGeneration => "[dev] stopMessageGeneration",
            ActionKind::GenerateMessageStart => "[api] generateMessageStart",
            ActionKind::GenerateMessageChunk => "[api] generateMessageChunk",
            ActionKind::GenerateMessageFinish => "[api] generateMessageFinish",
            ActionKind::GenerateMessageSuccess => "[api] generateMessageSuccess",
            ActionKind::GenerateMessageError => "[api] generateMessageError",
            ActionKind::GenerateMessageExhaustedRetries => "[api] generateMessageExhaustedRetries",
            ActionKind::ThreadLoadStart => "[api] threadLoadStart",
            ActionKind::ThreadLoadSuccess => "[api] threadLoadSuccess",
            ActionKind::ThreadLoadFailure => "[api] threadLoadFailure",
            ActionKind::ThreadSaveStart => "[api] threadSaveStart",
            ActionKind::ThreadSaveSuccess => "[api] threadSaveSuccess",
            ActionKind::ThreadSaveFailure => "[api] threadSaveFailure",
            ActionKind::AssistantTurnFinalized => "[api] assistantTurnFinalized",
            ActionKind::Sizzle => "[internal] sizzle",
            ActionKind::RunToolCallsSuccess => "[internal] runToolCallsSuccess",
            ActionKind::RunToolCallsError => "[internal] runToolCallsError",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl store::Action for Action {
    type Kind = ActionKind;

    fn kind(&self) -> ActionKind {
        match self {
            Action::Dev(action) => match action {
                DevAction::Init(_) => ActionKind::Init,
                DevAction::SetMessages(_) => ActionKind::SetMessages,
                DevAction::SendMessage(_) => ActionKind::SendMessage,
                DevAction::ResendMessages => ActionKind::ResendMessages,
                DevAction::UpdateOptions(_) => ActionKind::UpdateOptions,
                DevAction::StopMessageGeneration => ActionKind::StopMessageGeneration,
            },
            Action::Api(action) => match action {
                ApiAction::GenerateMessageStart => ActionKind::GenerateMessageStart,
                ApiAction::GenerateMessageChunk(_) => ActionKind::GenerateMessageChunk,
                ApiAction::GenerateMessageFinish => ActionKind::GenerateMessageFinish,
                ApiAction::GenerateMessageSuccess(_) => ActionKind::GenerateMessageSuccess,
                ApiAction::GenerateMessageError(_) => ActionKind::GenerateMessageError,
                ApiAction::GenerateMessageExhaustedRetries => {
                    ActionKind::GenerateMessageExhaustedRetries
                }
                ApiAction::ThreadLoadStart => ActionKind::ThreadLoadStart,
                ApiAction::ThreadLoadSuccess { .. } => ActionKind::ThreadLoadSuccess,
                ApiAction::ThreadLoadFailure(_) => ActionKind::ThreadLoadFailure,
                ApiAction::ThreadSaveStart => ActionKind::ThreadSaveStart,
                ApiAction::ThreadSaveSuccess { .. } => ActionKind::ThreadSaveSuccess,
                ApiAction::ThreadSaveFailure(_) => ActionKind::ThreadSaveFailure,
                ApiAction::AssistantTurnFinalized => ActionKind::AssistantTurnFinalized,
            },
            Action::Internal(action) => match action {
                InternalAction::Sizzle => ActionKind::Sizzle,
                InternalAction::RunToolCallsSuccess { .. } => ActionKind::RunToolCallsSuccess,
                InternalAction::RunToolCallsError(_) => ActionKind::RunToolCallsError,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Action as _;

    #[test]
    fn test_kind_and_name() {
        let action: Action = DevAction::SendMessage(view::Message::user("hi")).into();
        assert_eq!(action.kind(), ActionKind::SendMessage);
        assert_eq!(action.kind().name(), "[dev] sendMessage");

        let action: Action = InternalAction::Sizzle.into();
        assert_eq!(action.kind().to_string(), "[internal] sizzle");

        let action: Action = ApiAction::GenerateMessageError(Arc::new(Error::NoModelAvailable)).into();
        assert_eq!(action.kind(), ActionKind::GenerateMessageError);
    }
}
