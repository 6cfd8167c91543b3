//! The assistant message currently being streamed.
//!
//! Each `generateMessageChunk` carries the whole merged message so far. The
//! slice converts it to the internal shape and keeps its tool calls in a
//! separate table, reusing the stored `Arc` for calls whose content did not
//! change so per-call subscribers stay quiet.

use std::sync::Arc;

use crate::actions::{Action, ApiAction, DevAction};
use crate::models::{api, internal};
use crate::store::EntityState;
use crate::translate;

#[derive(Debug, Clone, Default)]
pub struct StreamingMessageState {
    pub message: Option<internal::Message>,
    pub tool_calls: EntityState<internal::ToolCall>,
}

pub fn reduce(state: &Arc<StreamingMessageState>, action: &Action) -> Arc<StreamingMessageState> {
    match action {
        Action::Api(ApiAction::GenerateMessageChunk(snapshot)) => Arc::new(StreamingMessageState {
            message: Some(translate::to_internal_message_from_api_assistant(snapshot)),
            tool_calls: merge_streaming_calls(&state.tool_calls, snapshot),
        }),
        Action::Api(
            ApiAction::GenerateMessageStart
            | ApiAction::GenerateMessageSuccess(_)
            | ApiAction::GenerateMessageError(_),
        )
        | Action::Dev(
            DevAction::StopMessageGeneration
            | DevAction::SetMessages(_)
            | DevAction::SendMessage(_)
            | DevAction::ResendMessages,
        ) => {
            if state.message.is_none() && state.tool_calls.is_empty() {
                return state.clone();
            }
            Arc::default()
        }
        _ => state.clone(),
    }
}

fn merge_streaming_calls(
    previous: &EntityState<internal::ToolCall>,
    snapshot: &api::AssistantMessage,
) -> EntityState<internal::ToolCall> {
    let calls = translate::to_internal_tool_calls_from_api(&snapshot.tool_calls);

    let stale: Vec<&str> = previous
        .ids()
        .iter()
        .map(String::as_str)
        .filter(|id| !calls.iter().any(|call| call.id == *id))
        .collect();
    let mut next = previous.remove_many(&stale);

    for call in calls {
        let unchanged = next.get(&call.id).is_some_and(|existing| **existing == call);
        if !unchanged {
            next = next.add_one(call);
        }
    }
    next
}
