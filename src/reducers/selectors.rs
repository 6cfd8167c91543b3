//! Derived views of [`State`].

use std::sync::Arc;

use super::State;
use crate::models::{api, internal, view};
use crate::store::{Selector, create_selector};
use crate::translate;

/// Memoized projection of the whole conversation as view messages.
pub type ViewMessagesSelector = Selector<State, Arc<Vec<view::Message>>>;

/// Build a selector for the committed history followed by the streaming
/// message, if any.
///
/// The committed part is recomputed only when messages, tool calls, tools or
/// config change; the streaming part only when the streaming slice, tools or
/// config change. Each call returns an independent cache.
pub fn view_messages_selector() -> ViewMessagesSelector {
    let committed = create_selector(
        |state: &State| {
            (
                state.messages.clone(),
                state.tool_calls.clone(),
                state.tools.clone(),
                state.config.clone(),
            )
        },
        |(messages, tool_calls, tools, config)| {
            Arc::new(translate::to_view_messages_from_internal(
                messages,
                tool_calls,
                tools,
                config.response_schema.as_ref(),
            ))
        },
    );

    let streaming = create_selector(
        |state: &State| {
            (
                state.streaming_message.clone(),
                state.tools.clone(),
                state.config.clone(),
            )
        },
        |(streaming, tools, config)| {
            Arc::new(streaming.message.as_ref().map(|message| {
                translate::to_view_message_from_internal(
                    message,
                    &streaming.tool_calls,
                    tools,
                    config.response_schema.as_ref(),
                )
            }))
        },
    );

    create_selector(
        move |state: &State| (committed.select(state), streaming.select(state)),
        |(committed, streaming)| {
            if streaming.is_none() {
                return committed.clone();
            }
            let mut all = Vec::with_capacity(committed.len() + 1);
            all.extend(committed.iter().cloned());
            all.extend(streaming.iter().cloned());
            Arc::new(all)
        },
    )
}

/// The in-flight assistant message as a view message.
pub fn streaming_view_message(state: &State) -> Option<view::Message> {
    state.streaming_message.message.as_ref().map(|message| {
        translate::to_view_message_from_internal(
            message,
            &state.streaming_message.tool_calls,
            &state.tools,
            state.config.response_schema.as_ref(),
        )
    })
}

pub fn last_assistant_message(messages: &[view::Message]) -> Option<&view::Message> {
    messages
        .iter()
        .rev()
        .find(|message| matches!(message, view::Message::Assistant { .. }))
}

/// Full wire history for a completion request.
pub fn api_messages(state: &State) -> Vec<api::Message> {
    translate::to_api_messages(&state.messages, &state.tool_calls)
}

/// True when the last wire message is a user or tool message, i.e. the model
/// owes a reply.
pub fn should_generate(state: &State) -> bool {
    let last = state
        .messages
        .iter()
        .rev()
        .map(|message| translate::to_api_messages_from_internal(message, &state.tool_calls))
        .find(|expanded| !expanded.is_empty())
        .and_then(|mut expanded| expanded.pop());

    matches!(last, Some(api::Message::User(_) | api::Message::Tool(_)))
}

pub fn should_load_thread(state: &State) -> bool {
    state.thread.should_load()
}

/// Tool definitions for the request. The synthetic `output` tool is offered
/// only when structured output is emulated and a schema is configured.
pub fn api_tools(state: &State) -> Vec<api::Tool> {
    let output_schema = state
        .config
        .response_schema
        .as_ref()
        .filter(|_| state.config.emulate_structured_output);
    translate::to_api_tools_from_internal(&state.tools, output_schema)
}

/// Pending calls the tool-execution effect should run.
pub fn pending_tool_calls(state: &State) -> Vec<Arc<internal::ToolCall>> {
    state
        .tool_calls
        .iter()
        .filter(|call| call.is_pending() && !call.is_output())
        .cloned()
        .collect()
}
