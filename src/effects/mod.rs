//! Effects: the asynchronous side of the chat store.
//!
//! Each effect registers `when` listeners on the store, spawns its work onto
//! the tokio runtime that was current when the store was built, and returns a
//! cleanup that cancels everything it started.

mod generate_message;
mod run_tool_calls;

pub(crate) use generate_message::generate_message;
pub(crate) use run_tool_calls::run_tool_calls;

use tokio::runtime::Handle;
use tracing::warn;

use crate::actions::Action;
use crate::reducers::State;
use crate::store::{Cleanup, Store};

/// The store every effect runs against.
pub type ChatStore = Store<State, Action>;

fn runtime(effect: &str) -> Option<Handle> {
    match Handle::try_current() {
        Ok(handle) => Some(handle),
        Err(_) => {
            warn!(effect, "no tokio runtime; effect disabled");
            None
        }
    }
}

fn noop() -> Cleanup {
    Box::new(|| {})
}
