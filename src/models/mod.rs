//! Message models for the three tiers: [`internal`] (normalized store
//! state), [`api`] (what goes over the wire) and [`view`] (what callers see).

pub mod api;
pub mod internal;
pub mod view;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Settlement of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Fulfilled { value: Value },
    Rejected { reason: Value },
}

impl ToolOutcome {
    pub fn fulfilled(value: Value) -> Self {
        ToolOutcome::Fulfilled { value }
    }

    pub fn rejected(error: &Error) -> Self {
        ToolOutcome::Rejected {
            reason: Value::String(error.to_string()),
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, ToolOutcome::Fulfilled { .. })
    }
}
