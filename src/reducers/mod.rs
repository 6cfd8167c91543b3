//! Store state and the per-slice reducers.
//!
//! Every slice lives behind an `Arc`. A slice reducer returns the same `Arc`
//! when an action does not concern it, so selectors and `select`
//! subscriptions can skip work with a pointer comparison.

mod config;
mod messages;
mod selectors;
mod status;
mod streaming_message;
mod thread;
mod tool_calls;
mod tools;

pub use config::{ConfigState, DEFAULT_DEBOUNCE, model_name};
pub use selectors::{
    ViewMessagesSelector, api_messages, api_tools, last_assistant_message, pending_tool_calls,
    should_generate, should_load_thread, streaming_view_message, view_messages_selector,
};
pub use status::StatusState;
pub use streaming_message::StreamingMessageState;
pub use thread::ThreadState;

use std::sync::Arc;

use crate::actions::Action;
use crate::models::internal;
use crate::store::EntityState;
use crate::tools::Tool;

/// Whole-store state.
#[derive(Debug, Clone)]
pub struct State {
    pub config: Arc<ConfigState>,
    pub status: Arc<StatusState>,
    pub messages: Arc<Vec<internal::Message>>,
    pub streaming_message: Arc<StreamingMessageState>,
    pub tool_calls: Arc<EntityState<internal::ToolCall>>,
    pub tools: Arc<EntityState<Tool>>,
    pub thread: Arc<ThreadState>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            config: Arc::default(),
            status: Arc::default(),
            messages: Arc::default(),
            streaming_message: Arc::default(),
            tool_calls: Arc::default(),
            tools: tools::initial_state(),
            thread: thread::initial_state(),
        }
    }
}

/// Root reducer: runs every slice reducer on its own slice.
pub fn reducer(state: &State, action: &Action) -> State {
    State {
        config: config::reduce(&state.config, action),
        status: status::reduce(&state.status, action),
        messages: messages::reduce(&state.messages, action),
        streaming_message: streaming_message::reduce(&state.streaming_message, action),
        tool_calls: tool_calls::reduce(&state.tool_calls, action),
        tools: tools::reduce(&state.tools, action),
        thread: thread::reduce(&state.thread, action),
    }
}
