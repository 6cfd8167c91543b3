//! The [`Chat`] facade.
//!
//! A `Chat` owns one store with the generation and tool-execution effects
//! registered. Commands dispatch `dev.*` actions and return immediately; the
//! effects do their work on the tokio runtime that was current when the chat
//! was created. State is read through snapshot getters or observed through
//! `observe_*` subscriptions.
//!
//! ```rust,no_run
//! use chat_engine::{Chat, ChatOptions};
//!
//! # async fn run() -> chat_engine::Result<()> {
//! let chat = Chat::new(
//!     ChatOptions::builder()
//!         .api_url("http://localhost:3000/api/chat")
//!         .model("gpt-4.1")
//!         .build()?,
//! )?;
//!
//! let _messages = chat.observe_messages(|messages| {
//!     println!("{} messages", messages.len());
//! });
//!
//! chat.send("Hello!");
//! chat.wait_for(&[chat_engine::ActionKind::AssistantTurnFinalized]).await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::actions::{Action, ActionKind, DevAction, InternalAction};
use crate::effects::{self, ChatStore};
use crate::models::view;
use crate::options::{ChatOptions, OptionsUpdate};
use crate::reducers::{
    self, State, StatusState, ThreadState, ViewMessagesSelector, last_assistant_message,
    streaming_view_message, view_messages_selector,
};
use crate::store::{Store, Subscription};
use crate::{Error, Result};

pub struct Chat {
    store: ChatStore,
    view_messages: Arc<ViewMessagesSelector>,
}

impl Chat {
    /// Build the store, start both effects and dispatch `dev.init` followed
    /// by `internal.sizzle`. A trailing user message in the initial history
    /// starts a generation right away.
    ///
    /// Fails when called outside a tokio runtime.
    pub fn new(options: ChatOptions) -> Result<Self> {
        Handle::try_current().map_err(|_| Error::config("Chat must be created inside a tokio runtime"))?;

        let mut builder = Store::builder(State::default(), reducers::reducer)
            .effect(effects::generate_message)
            .effect(effects::run_tool_calls);
        if let Some(sink) = options.debug_sink() {
            builder = builder.debug_sink(sink);
        }
        let store = builder.build();

        store.dispatch(DevAction::Init(Arc::new(options.init_payload())).into());
        store.dispatch(InternalAction::Sizzle.into());

        Ok(Self {
            store,
            view_messages: Arc::new(view_messages_selector()),
        })
    }

    /// Append a message and start a turn.
    pub fn send_message(&self, message: view::Message) {
        self.store.dispatch(DevAction::SendMessage(message).into());
    }

    /// Shorthand for sending a user message.
    pub fn send(&self, content: impl Into<String>) {
        self.send_message(view::Message::user(content));
    }

    /// Replace the history. A turn starts when the new history ends with a
    /// user message.
    pub fn set_messages(&self, messages: Vec<view::Message>) {
        self.store.dispatch(DevAction::SetMessages(messages).into());
    }

    /// Run the current history again.
    pub fn resend_messages(&self) {
        self.store.dispatch(DevAction::ResendMessages.into());
    }

    /// Abort the current attempt and any running tool batch.
    pub fn stop(&self) {
        self.store.dispatch(DevAction::StopMessageGeneration.into());
    }

    pub fn update_options(&self, update: OptionsUpdate) {
        self.store.dispatch(DevAction::UpdateOptions(Arc::new(update)).into());
    }

    /// The conversation as view messages, including the message being
    /// streamed.
    pub fn messages(&self) -> Arc<Vec<view::Message>> {
        self.store.read(|state| self.view_messages.select(state))
    }

    pub fn last_assistant_message(&self) -> Option<view::Message> {
        last_assistant_message(&self.messages()).cloned()
    }

    pub fn streaming_message(&self) -> Option<view::Message> {
        self.store.read(streaming_view_message)
    }

    pub fn status(&self) -> Arc<StatusState> {
        self.store.read(|state| state.status.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.store.read(|state| state.status.is_loading())
    }

    /// The last error, if the latest turn has not succeeded since.
    pub fn error(&self) -> Option<Arc<Error>> {
        self.store.read(|state| state.status.error.clone())
    }

    pub fn thread(&self) -> Arc<ThreadState> {
        self.store.read(|state| state.thread.clone())
    }

    pub fn thread_id(&self) -> Option<String> {
        self.store.read(|state| state.thread.thread_id.clone())
    }

    /// Snapshot of the whole store.
    pub fn state(&self) -> State {
        self.store.state()
    }

    /// Call `on_change` now and whenever the view messages change.
    pub fn observe_messages<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&Arc<Vec<view::Message>>) + Send + Sync + 'static,
    {
        let selector = self.view_messages.clone();
        self.store.select(move |state| selector.select(state), on_change)
    }

    pub fn observe_status<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&Arc<StatusState>) + Send + Sync + 'static,
    {
        self.store.select(|state| state.status.clone(), on_change)
    }

    pub fn observe_is_loading<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.store.select(|state| state.status.is_loading(), on_change)
    }

    pub fn observe_thread<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&Arc<ThreadState>) + Send + Sync + 'static,
    {
        self.store.select(|state| state.thread.clone(), on_change)
    }

    /// Listen for actions of the given kinds.
    pub fn when<F>(&self, kinds: &[ActionKind], callback: F) -> Subscription
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        self.store.when(kinds, callback)
    }

    pub fn when_once<F>(&self, kinds: &[ActionKind], callback: F) -> Subscription
    where
        F: FnOnce(&Action) + Send + 'static,
    {
        self.store.when_once(kinds, callback)
    }

    /// Resolve with the next action of one of the given kinds, or `None` if
    /// the chat is torn down first.
    pub async fn wait_for(&self, kinds: &[ActionKind]) -> Option<Action> {
        let (tx, rx) = oneshot::channel();
        let subscription = self.store.when_once(kinds, move |action| {
            let _ = tx.send(action.clone());
        });
        let action = rx.await.ok();
        subscription.unsubscribe();
        action
    }

    /// Cancel all effect work and drop every listener. Idempotent.
    pub fn teardown(&self) {
        self.store.teardown();
    }

    pub fn is_torn_down(&self) -> bool {
        self.store.is_torn_down()
    }
}

impl fmt::Debug for Chat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chat").field("store", &self.store).finish_non_exhaustive()
    }
}

impl Drop for Chat {
    fn drop(&mut self) {
        self.store.teardown();
    }
}
