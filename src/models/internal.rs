//! Normalized in-store message shapes.
//!
//! Assistant messages keep only tool-call ids; the calls themselves live in
//! an entity table so their status can change without rewriting history.

use serde_json::Value;

use super::ToolOutcome;
use crate::store::Entity;

/// Name of the synthetic tool used to emulate structured output.
pub const OUTPUT_TOOL_NAME: &str = "output";

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        tool_call_ids: Vec<String>,
    },
    Error {
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_call_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Done,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument string as streamed by the model.
    pub arguments: String,
    pub status: ToolCallStatus,
    pub result: Option<ToolOutcome>,
    /// Parsed arguments, once the argument string is complete JSON.
    pub arguments_resolved: Option<Value>,
}

impl ToolCall {
    pub fn pending(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        let arguments = arguments.into();
        Self {
            id: id.into(),
            name: name.into(),
            arguments_resolved: serde_json::from_str(&arguments).ok(),
            arguments,
            status: ToolCallStatus::Pending,
            result: None,
        }
    }

    pub fn is_output(&self) -> bool {
        self.name == OUTPUT_TOOL_NAME
    }

    pub fn is_pending(&self) -> bool {
        self.status == ToolCallStatus::Pending
    }
}

/// Partial update for a [`ToolCall`]; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallPatch {
    pub arguments: Option<String>,
    pub status: Option<ToolCallStatus>,
    pub result: Option<ToolOutcome>,
    pub arguments_resolved: Option<Value>,
}

impl ToolCallPatch {
    pub fn done(result: ToolOutcome) -> Self {
        Self {
            status: Some(ToolCallStatus::Done),
            result: Some(result),
            ..Default::default()
        }
    }
}

impl Entity for ToolCall {
    type Patch = ToolCallPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge(&self, patch: &ToolCallPatch) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: patch
                .arguments
                .clone()
                .unwrap_or_else(|| self.arguments.clone()),
            status: patch.status.unwrap_or(self.status),
            result: patch.result.clone().or_else(|| self.result.clone()),
            arguments_resolved: patch
                .arguments_resolved
                .clone()
                .or_else(|| self.arguments_resolved.clone()),
        }
    }
}
