//! Conversions between the three message tiers.
//!
//! All functions are pure. The rules worth knowing:
//!
//! - Tool results live on tool-call entities, so `tool` wire messages produce
//!   no internal message; they mark the matching call `done` instead.
//! - The synthetic `output` tool call carries structured output. Its arguments
//!   become the assistant message's content and it never shows up as a tool
//!   call in any tier.
//! - A view tool call whose tool is not registered is dropped.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::internal::{self, OUTPUT_TOOL_NAME, ToolCallStatus};
use crate::models::{api, view};
use crate::store::EntityState;
use crate::tools::Tool;

/// Description of the synthetic tool offered when structured output is
/// emulated.
pub const OUTPUT_TOOL_DESCRIPTION: &str =
    "This should be your final tool call. Generate a response that matches the provided schema.";

pub fn to_internal_messages_from_view(messages: &[view::Message]) -> Vec<internal::Message> {
    messages
        .iter()
        .filter_map(|message| match message {
            view::Message::User { content } => Some(internal::Message::user(content.clone())),
            view::Message::Assistant {
                content,
                tool_calls,
            } => Some(internal::Message::Assistant {
                content: content.as_ref().map(content_to_string),
                tool_call_ids: tool_calls.iter().map(|c| c.tool_call_id.clone()).collect(),
            }),
            view::Message::Error { .. } => None,
        })
        .collect()
}

pub fn to_internal_tool_calls_from_view(messages: &[view::Message]) -> Vec<internal::ToolCall> {
    messages
        .iter()
        .flat_map(view_tool_calls)
        .map(|call| internal::ToolCall {
            id: call.tool_call_id.clone(),
            name: call.name.clone(),
            arguments: call.args.to_string(),
            status: call.status,
            result: call.result.clone(),
            arguments_resolved: Some(call.args.clone()),
        })
        .collect()
}

fn view_tool_calls(message: &view::Message) -> &[view::ToolCall] {
    match message {
        view::Message::Assistant { tool_calls, .. } => tool_calls,
        _ => &[],
    }
}

pub fn to_internal_message_from_api(message: &api::Message) -> Option<internal::Message> {
    match message {
        api::Message::Tool(_) => None,
        api::Message::User(user) => Some(internal::Message::user(user.content.clone())),
        api::Message::Error(error) => Some(internal::Message::Error {
            content: error.content.clone(),
        }),
        api::Message::Assistant(assistant) => Some(to_internal_message_from_api_assistant(assistant)),
    }
}

pub fn to_internal_message_from_api_assistant(message: &api::AssistantMessage) -> internal::Message {
    let output = message
        .tool_calls
        .iter()
        .find(|call| call.function.name == OUTPUT_TOOL_NAME);

    internal::Message::Assistant {
        content: match output {
            Some(call) => Some(call.function.arguments.clone()),
            None => message.content.clone(),
        },
        tool_call_ids: message
            .tool_calls
            .iter()
            .filter(|call| call.function.name != OUTPUT_TOOL_NAME)
            .map(|call| call.id.clone())
            .collect(),
    }
}

pub fn to_internal_messages_from_api(messages: &[api::Message]) -> Vec<internal::Message> {
    messages.iter().filter_map(to_internal_message_from_api).collect()
}

/// Pending internal calls for every non-`output` call in `calls`.
pub fn to_internal_tool_calls_from_api(calls: &[api::ToolCall]) -> Vec<internal::ToolCall> {
    calls
        .iter()
        .filter(|call| call.function.name != OUTPUT_TOOL_NAME)
        .map(|call| {
            internal::ToolCall::pending(
                call.id.clone(),
                call.function.name.clone(),
                call.function.arguments.clone(),
            )
        })
        .collect()
}

/// Rebuild tool-call entities from a hydrated thread: calls declared by
/// assistant messages start pending, and each `tool` message marks its call
/// done with the recorded outcome.
pub fn to_internal_tool_calls_from_api_messages(messages: &[api::Message]) -> Vec<internal::ToolCall> {
    let mut order: Vec<String> = Vec::new();
    let mut calls: HashMap<String, internal::ToolCall> = HashMap::new();

    for message in messages {
        if let api::Message::Assistant(assistant) = message {
            for call in to_internal_tool_calls_from_api(&assistant.tool_calls) {
                if !calls.contains_key(&call.id) {
                    order.push(call.id.clone());
                }
                calls.insert(call.id.clone(), call);
            }
        }
    }

    for message in messages {
        if let api::Message::Tool(tool) = message {
            let (name, arguments, arguments_resolved) = match calls.get(&tool.tool_call_id) {
                Some(existing) => (
                    existing.name.clone(),
                    existing.arguments.clone(),
                    existing.arguments_resolved.clone(),
                ),
                None => {
                    order.push(tool.tool_call_id.clone());
                    (tool.tool_name.clone(), String::new(), None)
                }
            };
            calls.insert(
                tool.tool_call_id.clone(),
                internal::ToolCall {
                    id: tool.tool_call_id.clone(),
                    name,
                    arguments,
                    status: ToolCallStatus::Done,
                    result: Some(tool.content.clone()),
                    arguments_resolved,
                },
            );
        }
    }

    order.into_iter().filter_map(|id| calls.remove(&id)).collect()
}

/// Expand one internal message into wire messages. An assistant message is
/// followed by one `tool` message per referenced call that is done; error
/// messages expand to nothing.
pub fn to_api_messages_from_internal(
    message: &internal::Message,
    tool_calls: &EntityState<internal::ToolCall>,
) -> Vec<api::Message> {
    match message {
        internal::Message::User { content } => vec![api::Message::user(content.clone())],
        // error messages are local only and never sent to the model
        internal::Message::Error { .. } => Vec::new(),
        internal::Message::Assistant {
            content,
            tool_call_ids,
        } => {
            let calls: Vec<&Arc<internal::ToolCall>> = tool_call_ids
                .iter()
                .filter_map(|id| tool_calls.get(id))
                .filter(|call| !call.is_output())
                .collect();

            let mut out = Vec::with_capacity(calls.len() + 1);
            out.push(api::Message::Assistant(api::AssistantMessage {
                content: Some(content.clone().unwrap_or_default()),
                tool_calls: calls
                    .iter()
                    .enumerate()
                    .map(|(index, call)| {
                        api::ToolCall::new(call.id.clone(), index as u32, call.name.clone(), call.arguments.clone())
                    })
                    .collect(),
            }));

            for call in calls {
                if let (ToolCallStatus::Done, Some(result)) = (call.status, &call.result) {
                    out.push(api::Message::Tool(api::ToolMessage {
                        content: result.clone(),
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                    }));
                }
            }
            out
        }
    }
}

pub fn to_api_messages(
    messages: &[internal::Message],
    tool_calls: &EntityState<internal::ToolCall>,
) -> Vec<api::Message> {
    messages
        .iter()
        .flat_map(|message| to_api_messages_from_internal(message, tool_calls))
        .collect()
}

/// Join an internal message with tool-call entities and tool definitions.
///
/// With a response schema, assistant content that parses to an object or
/// array is surfaced as that value instead of the raw string.
pub fn to_view_message_from_internal(
    message: &internal::Message,
    tool_calls: &EntityState<internal::ToolCall>,
    tools: &EntityState<Tool>,
    response_schema: Option<&Value>,
) -> view::Message {
    match message {
        internal::Message::User { content } => view::Message::user(content.clone()),
        internal::Message::Error { content } => view::Message::error(content.clone()),
        internal::Message::Assistant {
            content,
            tool_call_ids,
        } => view::Message::Assistant {
            content: Some(view_content(content.as_deref().unwrap_or_default(), response_schema)),
            tool_calls: tool_call_ids
                .iter()
                .filter_map(|id| tool_calls.get(id))
                .filter(|call| tools.contains(&call.name))
                .map(|call| to_view_tool_call(call))
                .collect(),
        },
    }
}

pub fn to_view_messages_from_internal(
    messages: &[internal::Message],
    tool_calls: &EntityState<internal::ToolCall>,
    tools: &EntityState<Tool>,
    response_schema: Option<&Value>,
) -> Vec<view::Message> {
    messages
        .iter()
        .map(|message| to_view_message_from_internal(message, tool_calls, tools, response_schema))
        .collect()
}

fn to_view_tool_call(call: &internal::ToolCall) -> view::ToolCall {
    let args = match call.status {
        ToolCallStatus::Pending => call.arguments_resolved.clone().unwrap_or(Value::Null),
        ToolCallStatus::Done => call
            .arguments_resolved
            .clone()
            .or_else(|| serde_json::from_str(&call.arguments).ok())
            .unwrap_or(Value::Null),
    };

    view::ToolCall {
        tool_call_id: call.id.clone(),
        name: call.name.clone(),
        args,
        status: call.status,
        result: match call.status {
            ToolCallStatus::Done => call.result.clone(),
            ToolCallStatus::Pending => None,
        },
    }
}

fn view_content(content: &str, response_schema: Option<&Value>) -> Value {
    if response_schema.is_some() {
        if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str::<Value>(content) {
            return parsed;
        }
    }
    Value::String(content.to_string())
}

fn content_to_string(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Tool definitions for the request, plus the synthetic `output` tool when
/// structured output is emulated.
pub fn to_api_tools_from_internal(tools: &EntityState<Tool>, output_schema: Option<&Value>) -> Vec<api::Tool> {
    let mut api_tools: Vec<api::Tool> = tools.iter().map(|tool| tool.to_api_tool()).collect();
    if let Some(schema) = output_schema {
        api_tools.push(api::Tool {
            name: OUTPUT_TOOL_NAME.to_string(),
            description: OUTPUT_TOOL_DESCRIPTION.to_string(),
            parameters: schema.clone(),
        });
    }
    api_tools
}

/// Messages after the last assistant message; the part of the history a
/// persisted thread has not seen yet.
pub fn extract_message_delta(messages: &[api::Message]) -> Vec<api::Message> {
    match messages.iter().rposition(api::Message::is_assistant) {
        Some(index) => messages[index + 1..].to_vec(),
        None => messages.to_vec(),
    }
}
