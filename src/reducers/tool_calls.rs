//! Tool-call entity slice.

use std::sync::Arc;

use crate::actions::{Action, ApiAction, DevAction, InternalAction};
use crate::models::ToolOutcome;
use crate::models::internal::{ToolCall, ToolCallPatch};
use crate::store::{EntityState, EntityUpdate};
use crate::translate;

pub type ToolCallsState = Arc<EntityState<ToolCall>>;

pub fn reduce(state: &ToolCallsState, action: &Action) -> ToolCallsState {
    match action {
        Action::Dev(DevAction::Init(init)) => Arc::new(EntityState::set_all(
            translate::to_internal_tool_calls_from_view(&init.messages),
        )),
        Action::Dev(DevAction::SetMessages(messages)) => Arc::new(EntityState::set_all(
            translate::to_internal_tool_calls_from_view(messages),
        )),
        Action::Dev(DevAction::SendMessage(message)) => {
            let calls = translate::to_internal_tool_calls_from_view(std::slice::from_ref(message));
            if calls.is_empty() {
                return state.clone();
            }
            Arc::new(state.add_many(calls))
        }
        Action::Api(ApiAction::GenerateMessageSuccess(generated)) => {
            if generated.tool_calls.is_empty() {
                return state.clone();
            }
            Arc::new(state.add_many(generated.tool_calls.iter().cloned()))
        }
        Action::Api(ApiAction::ThreadLoadSuccess { thread }) => Arc::new(EntityState::set_all(
            translate::to_internal_tool_calls_from_api_messages(thread),
        )),
        Action::Internal(InternalAction::RunToolCallsSuccess { tool_messages }) => {
            let updates: Vec<EntityUpdate<ToolCallPatch>> = tool_messages
                .iter()
                .map(|message| {
                    EntityUpdate::new(
                        message.tool_call_id.clone(),
                        ToolCallPatch::done(message.content.clone()),
                    )
                })
                .collect();
            Arc::new(state.update_many(&updates))
        }
        // an aborted batch settles as rejected so it never runs again
        Action::Internal(InternalAction::RunToolCallsError(error)) => {
            let updates: Vec<EntityUpdate<ToolCallPatch>> = state
                .iter()
                .filter(|call| call.is_pending() && !call.is_output())
                .map(|call| {
                    EntityUpdate::new(call.id.clone(), ToolCallPatch::done(ToolOutcome::rejected(error)))
                })
                .collect();
            if updates.is_empty() {
                return state.clone();
            }
            Arc::new(state.update_many(&updates))
        }
        _ => state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::GeneratedMessage;
    use crate::models::internal::ToolCallStatus;
    use crate::Error;
    use crate::models::api;
    use serde_json::json;

    #[test]
    fn test_tool_results_mark_calls_done() {
        let state: ToolCallsState = Arc::new(EntityState::from_entities(vec![
            ToolCall::pending("a", "t", "{}"),
            ToolCall::pending("b", "t", "{}"),
            ToolCall::pending("c", "t", "{}"),
        ]));

        let action = InternalAction::RunToolCallsSuccess {
            tool_messages: vec![
                api::ToolMessage {
                    content: ToolOutcome::fulfilled(json!(1)),
                    tool_call_id: "a".into(),
                    tool_name: "t".into(),
                },
                api::ToolMessage {
                    content: ToolOutcome::Rejected { reason: json!("no") },
                    tool_call_id: "b".into(),
                    tool_name: "t".into(),
                },
            ],
        };
        let next = reduce(&state, &action.into());

        assert_eq!(next.get("a").unwrap().status, ToolCallStatus::Done);
        assert_eq!(next.get("b").unwrap().status, ToolCallStatus::Done);
        assert!(!next.get("b").unwrap().result.as_ref().unwrap().is_fulfilled());
        assert!(Arc::ptr_eq(next.get("c").unwrap(), state.get("c").unwrap()));
    }

    #[test]
    fn test_cancelled_batch_settles_pending_calls_as_rejected() {
        let mut done = ToolCall::pending("a", "t", "{}");
        done.status = ToolCallStatus::Done;
        done.result = Some(ToolOutcome::fulfilled(json!(1)));
        let state: ToolCallsState = Arc::new(EntityState::from_entities(vec![
            done,
            ToolCall::pending("b", "t", "{}"),
        ]));

        let next = reduce(
            &state,
            &InternalAction::RunToolCallsError(Arc::new(Error::Cancelled)).into(),
        );

        assert!(Arc::ptr_eq(next.get("a").unwrap(), state.get("a").unwrap()));
        let b = next.get("b").unwrap();
        assert_eq!(b.status, ToolCallStatus::Done);
        assert_eq!(
            b.result,
            Some(ToolOutcome::Rejected { reason: json!("Operation cancelled") })
        );
    }

    #[test]
    fn test_success_adds_pending_calls() {
        let state: ToolCallsState = Arc::default();
        let action = ApiAction::GenerateMessageSuccess(GeneratedMessage {
            message: api::AssistantMessage::default(),
            tool_calls: vec![ToolCall::pending("x", "t", "{}")],
        });
        let next = reduce(&state, &action.into());
        assert_eq!(next.ids(), ["x".to_string()]);
    }
}
