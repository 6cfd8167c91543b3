//! Merging streamed completion chunks into an assistant message snapshot.
//!
//! Tool calls arrive as incremental deltas keyed by `index`:
//!
//! ```text
//! Chunk 1: { toolCalls: [{ index: 0, id: "call_abc", function: { name: "get_weather" } }] }
//! Chunk 2: { toolCalls: [{ index: 0, function: { arguments: "{\"loc" } }] }
//! Chunk 3: { toolCalls: [{ index: 0, function: { arguments: "ation\":\"Paris\"}" } }] }
//! ```
//!
//! [`update_message_with_delta`] folds each chunk into the running snapshot so
//! the generation effect can dispatch the whole message after every frame.

use crate::models::api::{AssistantMessage, CompletionChunk, FunctionCall, ToolCall, ToolCallDelta};

/// Fold `chunk` into `message`.
///
/// Only the first choice is considered. A message is started when the delta
/// carries `role: "assistant"`; content is appended (missing content counts
/// as empty) and tool calls are merged by index. Returns `None` when there is
/// neither a previous message nor a delta that starts one.
pub fn update_message_with_delta(
    message: Option<AssistantMessage>,
    chunk: &CompletionChunk,
) -> Option<AssistantMessage> {
    let Some(choice) = chunk.choices.first() else {
        return message;
    };
    let delta = &choice.delta;

    let base = match message {
        Some(message) => message,
        None if delta.role.as_deref() == Some("assistant") => AssistantMessage {
            content: Some(String::new()),
            tool_calls: Vec::new(),
        },
        None => return None,
    };

    let content = match (base.content, delta.content.as_deref()) {
        (existing, None) => existing,
        (existing, Some(more)) => Some(existing.unwrap_or_default() + more),
    };

    let tool_calls = match &delta.tool_calls {
        Some(deltas) => merge_tool_calls(base.tool_calls, deltas),
        None => base.tool_calls,
    };

    Some(AssistantMessage {
        content,
        tool_calls,
    })
}

/// Merge tool-call deltas into existing calls by index.
///
/// Argument fragments are concatenated; a delta for an unseen index starts a
/// new call, using `tool-call-{index}` when the delta carries no id.
pub fn merge_tool_calls(mut existing: Vec<ToolCall>, deltas: &[ToolCallDelta]) -> Vec<ToolCall> {
    for delta in deltas {
        let fragment = delta
            .function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .unwrap_or_default();

        match existing.iter_mut().find(|call| call.index == delta.index) {
            Some(call) => {
                call.function.arguments.push_str(fragment);
                if let Some(name) = delta.function.as_ref().and_then(|f| f.name.as_ref()) {
                    if call.function.name.is_empty() {
                        call.function.name = name.clone();
                    }
                }
                if let Some(id) = &delta.id {
                    call.id = id.clone();
                }
            }
            None => existing.push(ToolCall {
                id: delta
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("tool-call-{}", delta.index)),
                index: delta.index,
                call_type: delta
                    .call_type
                    .clone()
                    .unwrap_or_else(|| "function".to_string()),
                function: FunctionCall {
                    name: delta
                        .function
                        .as_ref()
                        .and_then(|f| f.name.clone())
                        .unwrap_or_default(),
                    arguments: fragment.to_string(),
                },
            }),
        }
    }
    existing
}
