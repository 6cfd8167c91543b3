//! # Open Chat Engine
//!
//! A client-side conversation engine for streaming LLM backends.
//!
//! ## Overview
//!
//! The engine keeps a conversation in a small reactive store and drives the
//! backend through two effects:
//!
//! - the **generation effect** debounces a turn, resolves a model from an
//!   ordered preference list, streams frames from a transport and retries or
//!   falls back on failure
//! - the **tool-execution effect** validates tool-call arguments against each
//!   tool's schema and runs every pending call concurrently
//!
//! Callers talk to a [`Chat`]: send messages, stop generation, patch options,
//! and observe view messages and status as they change.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chat_engine::{ActionKind, Chat, ChatOptions, tool};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let weather = tool("get_weather", "Current weather for a city")
//!         .param("city", "string")
//!         .build(|args, _cancel| async move {
//!             Ok(json!({"city": args["city"], "temperature": 21}))
//!         });
//!
//!     let options = ChatOptions::builder()
//!         .api_url("http://localhost:3000/api/chat")
//!         .model("gpt-4.1")
//!         .system("You are a helpful assistant")
//!         .tool(weather)
//!         .build()?;
//!
//!     let chat = Chat::new(options)?;
//!     chat.send("What's the weather in Paris?");
//!
//!     // a tool round trip finalizes twice; stop once nothing is pending
//!     while chat.wait_for(&[ActionKind::AssistantTurnFinalized]).await.is_some() {
//!         if !chat.is_loading() {
//!             break;
//!         }
//!     }
//!
//!     if let Some(reply) = chat.last_assistant_message() {
//!         println!("{reply:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **store**: actions, reducers, memoized selectors, entity tables and the
//!   reentrancy-safe dispatch scheduler
//! - **reducers**: the config, status, messages, streaming-message,
//!   tool-calls, tools and thread slices, plus derived selectors
//! - **effects**: generation and tool execution
//! - **transport**: the `Transport` trait, the HTTP transport and the model
//!   resolver
//! - **frames** / **delta**: the frame codec and chunk merging
//! - **translate**: conversions between the internal, wire and view message
//!   tiers

mod chat;
mod config;
mod effects;
mod error;
mod middleware;
mod options;
mod reducers;
mod schema;
mod tools;
mod translate;

pub mod actions;
pub mod delta;
pub mod frames;
pub mod models;
pub mod retry;
pub mod store;
pub mod transport;

// --- Chat facade ---

pub use chat::Chat;
pub use options::{ChatOptions, ChatOptionsBuilder, OptionsUpdate};

// --- Configuration ---

pub use config::{API_URL_ENV, MODEL_ENV, get_api_url, get_model};

// --- Actions and state ---

pub use actions::{Action, ActionKind, ApiAction, DevAction, InternalAction};
pub use effects::ChatStore;
pub use reducers::{
    ConfigState, DEFAULT_DEBOUNCE, State, StatusState, StreamingMessageState, ThreadState,
    ViewMessagesSelector, api_messages, api_tools, last_assistant_message, pending_tool_calls,
    reducer, should_generate, should_load_thread, view_messages_selector,
};

// --- Error handling ---

pub use error::{Error, Result, TransportError, TransportErrorCode};

// --- Middleware ---

pub use middleware::{HttpRequest, Middleware, bearer_auth, middleware};

// --- Tools ---

pub use schema::{SchemaError, SchemaErrorKind};
pub use tools::{Tool, ToolBuilder, ToolHandler, tool};

// --- Translation ---

pub use translate::{
    OUTPUT_TOOL_DESCRIPTION, extract_message_delta, to_api_messages, to_api_messages_from_internal,
    to_api_tools_from_internal, to_internal_message_from_api, to_internal_message_from_api_assistant,
    to_internal_messages_from_api, to_internal_messages_from_view, to_internal_tool_calls_from_api,
    to_internal_tool_calls_from_api_messages, to_internal_tool_calls_from_view,
    to_view_message_from_internal, to_view_messages_from_internal,
};

// --- Transports ---

pub use retry::RetryConfig;
pub use transport::{
    HttpTransport, ModelInput, ModelResolver, ModelSpec, Transport, TransportRequest,
    TransportResponse, WireFormat,
};

/// Convenience module containing the most commonly used types and functions.
/// Import with `use chat_engine::prelude::*;`.
pub mod prelude {
    pub use crate::models::{ToolOutcome, view};
    pub use crate::{
        ActionKind, Chat, ChatOptions, Error, ModelInput, ModelSpec, OptionsUpdate, Result,
        RetryConfig, Tool, Transport, TransportResponse, bearer_auth, tool,
    };
}
