//! Turn phase flags and the last error.

use std::sync::Arc;

use crate::Error;
use crate::actions::{Action, ApiAction, DevAction, InternalAction};
use crate::models::view;

#[derive(Debug, Clone, Default)]
pub struct StatusState {
    /// A request is queued or in flight and no frame has arrived yet.
    pub is_sending: bool,
    /// Frames are arriving for the current attempt.
    pub is_receiving: bool,
    pub is_generating: bool,
    pub is_running_tool_calls: bool,
    pub error: Option<Arc<Error>>,
    /// Error raised before the first frame of an attempt.
    pub sending_error: Option<Arc<Error>>,
    /// Error raised while frames were arriving.
    pub generating_error: Option<Arc<Error>>,
    pub exhausted_retries: bool,
}

impl StatusState {
    pub fn is_loading(&self) -> bool {
        self.is_sending || self.is_receiving || self.is_running_tool_calls
    }
}

fn ends_with_user(messages: &[view::Message]) -> bool {
    matches!(messages.last(), Some(view::Message::User { .. }))
}

/// A new trigger supersedes whatever attempt was streaming.
fn sending(state: &StatusState) -> StatusState {
    StatusState {
        is_sending: true,
        is_receiving: false,
        is_generating: false,
        sending_error: None,
        ..state.clone()
    }
}

fn idle(state: &StatusState) -> StatusState {
    StatusState {
        is_sending: false,
        is_receiving: false,
        is_generating: false,
        ..state.clone()
    }
}

pub fn reduce(state: &Arc<StatusState>, action: &Action) -> Arc<StatusState> {
    let next = match action {
        Action::Dev(DevAction::Init(init)) => StatusState {
            is_sending: ends_with_user(&init.messages),
            ..StatusState::default()
        },
        Action::Dev(DevAction::SetMessages(messages)) => {
            if ends_with_user(messages) {
                sending(state)
            } else if state.is_sending || state.is_receiving || state.is_generating {
                // the running turn is superseded and nothing replaces it
                idle(state)
            } else {
                return state.clone();
            }
        }
        Action::Dev(DevAction::SendMessage(_) | DevAction::ResendMessages) => sending(state),
        Action::Dev(DevAction::StopMessageGeneration) => StatusState::default(),
        Action::Api(ApiAction::GenerateMessageStart) => StatusState {
            is_sending: false,
            is_receiving: true,
            is_generating: true,
            generating_error: None,
            ..StatusState::clone(state)
        },
        Action::Api(ApiAction::GenerateMessageChunk(_)) => {
            if state.is_receiving && state.is_generating {
                return state.clone();
            }
            StatusState {
                is_receiving: true,
                is_generating: true,
                ..StatusState::clone(state)
            }
        }
        Action::Api(ApiAction::GenerateMessageSuccess(generated)) => StatusState {
            is_receiving: false,
            is_generating: false,
            is_running_tool_calls: generated
                .tool_calls
                .iter()
                .any(|call| call.is_pending() && !call.is_output()),
            error: None,
            generating_error: None,
            exhausted_retries: false,
            ..StatusState::clone(state)
        },
        Action::Api(ApiAction::GenerateMessageError(error)) => {
            let mid_stream = state.is_receiving || state.is_generating;
            let mut next = StatusState {
                is_receiving: false,
                is_generating: false,
                error: Some(error.clone()),
                ..StatusState::clone(state)
            };
            if mid_stream {
                next.generating_error = Some(error.clone());
            } else {
                next.sending_error = Some(error.clone());
            }
            next
        }
        Action::Api(ApiAction::GenerateMessageExhaustedRetries) => StatusState {
            exhausted_retries: true,
            ..StatusState::clone(state)
        },
        Action::Api(ApiAction::AssistantTurnFinalized) => StatusState {
            is_sending: false,
            is_receiving: false,
            is_generating: false,
            ..StatusState::clone(state)
        },
        Action::Internal(InternalAction::RunToolCallsSuccess { .. }) => StatusState {
            is_running_tool_calls: false,
            is_sending: true,
            ..StatusState::clone(state)
        },
        Action::Internal(InternalAction::RunToolCallsError(error)) => StatusState {
            is_running_tool_calls: false,
            error: Some(error.clone()),
            ..StatusState::clone(state)
        },
        _ => return state.clone(),
    };
    Arc::new(next)
}
