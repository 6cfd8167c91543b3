//! Caller-facing message shapes, rebuilt from store state on demand.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ToolOutcome;
use super::internal::ToolCallStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        /// Text, or the parsed value when a response schema is configured.
        content: Option<Value>,
        #[serde(default, rename = "toolCalls", skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
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
            content: Some(Value::String(content.into())),
            tool_calls: Vec::new(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Message::Error {
            content: content.into(),
        }
    }
}

/// A tool call as presented to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_call_id: String,
    pub name: String,
    /// Parsed arguments; `null` while a pending call is still streaming.
    pub args: Value,
    #[serde(with = "status_serde")]
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutcome>,
}

impl ToolCall {
    pub fn is_done(&self) -> bool {
        self.status == ToolCallStatus::Done
    }
}

mod status_serde {
    use super::ToolCallStatus;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &ToolCallStatus, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match status {
            ToolCallStatus::Pending => "pending",
            ToolCallStatus::Done => "done",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ToolCallStatus, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "pending" => Ok(ToolCallStatus::Pending),
            "done" => Ok(ToolCallStatus::Done),
            other => Err(serde::de::Error::unknown_variant(other, &["pending", "done"])),
        }
    }
}
