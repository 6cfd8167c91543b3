//! Options for constructing a [`crate::Chat`] and for patching it later.
//!
//! ```rust,no_run
//! use chat_engine::{ChatOptions, bearer_auth};
//! use std::time::Duration;
//!
//! let options = ChatOptions::builder()
//!     .api_url("http://localhost:3000/api/chat")
//!     .model("gpt-4.1")
//!     .system("You are a helpful assistant.")
//!     .middleware(bearer_auth("secret"))
//!     .debounce(Duration::from_millis(50))
//!     .retries(2)
//!     .build()?;
//! # Ok::<(), chat_engine::Error>(())
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::{Action, InitPayload};
use crate::middleware::Middleware;
use crate::models::internal::OUTPUT_TOOL_NAME;
use crate::models::view;
use crate::reducers::{ConfigState, State};
use crate::retry::RetryConfig;
use crate::store::DebugSink;
use crate::tools::Tool;
use crate::transport::{ModelInput, Transport};

/// Validated options for a [`crate::Chat`].
#[derive(Clone)]
pub struct ChatOptions {
    config: ConfigState,
    tools: Vec<Tool>,
    messages: Vec<view::Message>,
    debug_sink: Option<Arc<dyn DebugSink<State, Action>>>,
}

impl fmt::Debug for ChatOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOptions")
            .field("config", &self.config)
            .field("tools", &self.tools.iter().map(Tool::name).collect::<Vec<_>>())
            .field("messages", &self.messages.len())
            .field("debug_sink", &self.debug_sink.is_some())
            .finish()
    }
}

impl ChatOptions {
    pub fn builder() -> ChatOptionsBuilder {
        ChatOptionsBuilder::default()
    }

    pub fn config(&self) -> &ConfigState {
        &self.config
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn messages(&self) -> &[view::Message] {
        &self.messages
    }

    pub(crate) fn debug_sink(&self) -> Option<Arc<dyn DebugSink<State, Action>>> {
        self.debug_sink.clone()
    }

    pub(crate) fn init_payload(&self) -> InitPayload {
        InitPayload {
            config: self.config.clone(),
            tools: self.tools.clone(),
            messages: self.messages.clone(),
        }
    }
}

/// Builder for [`ChatOptions`].
#[derive(Default)]
pub struct ChatOptionsBuilder {
    api_url: Option<String>,
    model: Option<ModelInput>,
    system: Option<String>,
    debounce: Option<Duration>,
    response_schema: Option<Value>,
    middleware: Vec<Arc<dyn Middleware>>,
    emulate_structured_output: Option<bool>,
    retries: Option<u32>,
    retry: Option<RetryConfig>,
    transport: Option<Arc<dyn Transport>>,
    ui: Option<bool>,
    thread_id: Option<String>,
    tools: Vec<Tool>,
    messages: Vec<view::Message>,
    debug_sink: Option<Arc<dyn DebugSink<State, Action>>>,
}

impl fmt::Debug for ChatOptionsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOptionsBuilder")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("system", &self.system)
            .field("retries", &self.retries)
            .field("tools", &self.tools.len())
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}

impl ChatOptionsBuilder {
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// A model name, a [`crate::ModelSpec`], or an ordered fallback list.
    pub fn model(mut self, model: impl Into<ModelInput>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn system(mut self, prompt: impl Into<String>) -> Self {
        self.system = Some(prompt.into());
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    pub fn response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn emulate_structured_output(mut self, emulate: bool) -> Self {
        self.emulate_structured_output = Some(emulate);
        self
    }

    /// Extra attempts after the first one fails.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn retry_backoff(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Transport for named models, instead of HTTP to `api_url`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn ui(mut self, ui: bool) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Initial conversation. A trailing user message starts a generation as
    /// soon as the chat is created.
    pub fn messages(mut self, messages: Vec<view::Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn debug_sink(mut self, sink: Arc<dyn DebugSink<State, Action>>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    pub fn build(self) -> crate::Result<ChatOptions> {
        let model = self
            .model
            .filter(|model| !model.is_empty())
            .ok_or_else(|| crate::Error::config("model is required"))?;

        if let Some(tool) = self.tools.iter().find(|t| t.name() == OUTPUT_TOOL_NAME) {
            return Err(crate::Error::config(format!(
                "tool name \"{}\" is reserved for structured output",
                tool.name()
            )));
        }

        let defaults = ConfigState::default();
        Ok(ChatOptions {
            config: ConfigState {
                api_url: self.api_url,
                model,
                system: self.system.unwrap_or_default(),
                debounce: self.debounce.unwrap_or(defaults.debounce),
                response_schema: self.response_schema,
                middleware: self.middleware,
                emulate_structured_output: self
                    .emulate_structured_output
                    .unwrap_or(defaults.emulate_structured_output),
                retries: self.retries.unwrap_or(defaults.retries),
                retry: self.retry.unwrap_or(defaults.retry),
                transport: self.transport,
                ui: self.ui.unwrap_or(defaults.ui),
                thread_id: self.thread_id,
            },
            tools: self.tools,
            messages: self.messages,
            debug_sink: self.debug_sink,
        })
    }
}

/// Patch applied by `dev.updateOptions`. Unset fields keep their value.
///
/// Fields that can be cleared are doubly optional: `Some(None)` clears,
/// `None` leaves the current value alone.
#[derive(Clone, Default)]
pub struct OptionsUpdate {
    pub api_url: Option<Option<String>>,
    pub model: Option<ModelInput>,
    pub system: Option<String>,
    pub debounce: Option<Duration>,
    pub response_schema: Option<Option<Value>>,
    pub middleware: Option<Vec<Arc<dyn Middleware>>>,
    pub emulate_structured_output: Option<bool>,
    pub retries: Option<u32>,
    pub retry: Option<RetryConfig>,
    pub transport: Option<Option<Arc<dyn Transport>>>,
    pub ui: Option<bool>,
    pub thread_id: Option<Option<String>>,
    /// Replaces the registered tools.
    pub tools: Option<Vec<Tool>>,
}

impl OptionsUpdate {
    pub(crate) fn apply_to(&self, config: &mut ConfigState) {
        if let Some(api_url) = &self.api_url {
            config.api_url = api_url.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(system) = &self.system {
            config.system = system.clone();
        }
        if let Some(debounce) = self.debounce {
            config.debounce = debounce;
        }
        if let Some(schema) = &self.response_schema {
            config.response_schema = schema.clone();
        }
        if let Some(middleware) = &self.middleware {
            config.middleware = middleware.clone();
        }
        if let Some(emulate) = self.emulate_structured_output {
            config.emulate_structured_output = emulate;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(retry) = &self.retry {
            config.retry = retry.clone();
        }
        if let Some(transport) = &self.transport {
            config.transport = transport.clone();
        }
        if let Some(ui) = self.ui {
            config.ui = ui;
        }
        if let Some(thread_id) = &self.thread_id {
            config.thread_id = thread_id.clone();
        }
    }
}

impl fmt::Debug for OptionsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsUpdate")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("system", &self.system)
            .field("debounce", &self.debounce)
            .field("response_schema", &self.response_schema)
            .field("retries", &self.retries)
            .field("ui", &self.ui)
            .field("thread_id", &self.thread_id)
            .field("tools", &self.tools.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}
