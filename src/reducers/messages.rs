//! Message history slice.

use std::sync::Arc;

use crate::actions::{Action, ApiAction, DevAction};
use crate::models::internal;
use crate::translate;

pub type MessagesState = Arc<Vec<internal::Message>>;

pub fn reduce(state: &MessagesState, action: &Action) -> MessagesState {
    match action {
        Action::Dev(DevAction::Init(init)) => {
            Arc::new(translate::to_internal_messages_from_view(&init.messages))
        }
        Action::Dev(DevAction::SetMessages(messages)) => {
            Arc::new(translate::to_internal_messages_from_view(messages))
        }
        Action::Dev(DevAction::SendMessage(message)) => {
            let mut next = Vec::clone(state);
            next.extend(translate::to_internal_messages_from_view(std::slice::from_ref(message)));
            Arc::new(next)
        }
        Action::Api(ApiAction::GenerateMessageSuccess(generated)) => {
            let mut next = Vec::clone(state);
            next.push(translate::to_internal_message_from_api_assistant(&generated.message));
            Arc::new(next)
        }
        Action::Api(ApiAction::ThreadLoadSuccess { thread }) => {
            Arc::new(translate::to_internal_messages_from_api(thread))
        }
        _ => state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::GeneratedMessage;
    use crate::models::{api, view};

    #[test]
    fn test_send_appends() {
        let state: MessagesState = Arc::new(vec![internal::Message::user("a")]);
        let next = reduce(&state, &DevAction::SendMessage(view::Message::user("b")).into());
        assert_eq!(next.len(), 2);
        assert_eq!(next[1], internal::Message::user("b"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_success_appends_assistant() {
        let state: MessagesState = Arc::new(vec![internal::Message::user("a")]);
        let action = ApiAction::GenerateMessageSuccess(GeneratedMessage {
            message: api::AssistantMessage {
                content: Some("hello".into()),
                tool_calls: vec![],
            },
            tool_calls: vec![],
        });
        let next = reduce(&state, &action.into());
        assert_eq!(next[1], internal::Message::assistant("hello"));
    }

    #[test]
    fn test_unrelated_keeps_identity() {
        let state: MessagesState = Arc::new(vec![]);
        let next = reduce(&state, &ApiAction::GenerateMessageStart.into());
        assert!(Arc::ptr_eq(&state, &next));
    }
}
