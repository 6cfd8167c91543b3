//! Remote thread persistence: which thread the conversation belongs to and
//! whether its history has been hydrated.

use std::sync::{Arc, LazyLock};

use crate::actions::{Action, ActionKind, ApiAction, DevAction, RemoteFailure};
use crate::store::{Reducer, create_reducer, on};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadState {
    pub thread_id: Option<String>,
    pub is_loading_thread: bool,
    pub is_saving_thread: bool,
    pub thread_load_error: Option<RemoteFailure>,
    pub thread_save_error: Option<RemoteFailure>,
    /// Thread whose history is currently in the store.
    pub loaded_thread_id: Option<String>,
}

impl ThreadState {
    /// A thread id is set and its history has not been loaded yet.
    pub fn should_load(&self) -> bool {
        self.thread_id.is_some() && self.loaded_thread_id != self.thread_id
    }
}

type ThreadSlice = Arc<ThreadState>;

fn patch(state: &ThreadSlice, change: impl FnOnce(&mut ThreadState)) -> ThreadSlice {
    let mut next = ThreadState::clone(state);
    change(&mut next);
    Arc::new(next)
}

static REDUCER: LazyLock<Reducer<ThreadSlice, Action>> = LazyLock::new(|| {
    create_reducer(
        Arc::default(),
        vec![
            on(&[ActionKind::Init], |_: ThreadSlice, action: &Action| match action {
                Action::Dev(DevAction::Init(init)) => Arc::new(ThreadState {
                    thread_id: init.config.thread_id.clone(),
                    ..ThreadState::default()
                }),
                _ => Arc::default(),
            }),
            on(&[ActionKind::UpdateOptions], |state: ThreadSlice, action: &Action| {
                match action {
                    Action::Dev(DevAction::UpdateOptions(update)) => match &update.thread_id {
                        Some(thread_id) if *thread_id != state.thread_id => {
                            patch(&state, |s| s.thread_id = thread_id.clone())
                        }
                        _ => state,
                    },
                    _ => state,
                }
            }),
            on(&[ActionKind::ThreadLoadStart], |state: ThreadSlice, _: &Action| {
                patch(&state, |s| {
                    s.is_loading_thread = true;
                    s.thread_load_error = None;
                })
            }),
            on(&[ActionKind::ThreadLoadSuccess], |state: ThreadSlice, _: &Action| {
                patch(&state, |s| {
                    s.is_loading_thread = false;
                    s.loaded_thread_id = s.thread_id.clone();
                })
            }),
            on(&[ActionKind::ThreadLoadFailure], |state: ThreadSlice, action: &Action| {
                match action {
                    Action::Api(ApiAction::ThreadLoadFailure(failure)) => patch(&state, |s| {
                        s.is_loading_thread = false;
                        s.thread_load_error = Some(failure.clone());
                    }),
                    _ => state,
                }
            }),
            on(&[ActionKind::ThreadSaveStart], |state: ThreadSlice, _: &Action| {
                patch(&state, |s| {
                    s.is_saving_thread = true;
                    s.thread_save_error = None;
                })
            }),
            on(&[ActionKind::ThreadSaveSuccess], |state: ThreadSlice, action: &Action| {
                match action {
                    Action::Api(ApiAction::ThreadSaveSuccess { thread_id }) => patch(&state, |s| {
                        s.is_saving_thread = false;
                        // the server already has everything in the store
                        s.thread_id = Some(thread_id.clone());
                        s.loaded_thread_id = Some(thread_id.clone());
                    }),
                    _ => state,
                }
            }),
            on(&[ActionKind::ThreadSaveFailure], |state: ThreadSlice, action: &Action| {
                match action {
                    Action::Api(ApiAction::ThreadSaveFailure(failure)) => patch(&state, |s| {
                        s.is_saving_thread = false;
                        s.thread_save_error = Some(failure.clone());
                    }),
                    _ => state,
                }
            }),
        ],
    )
});

pub fn initial_state() -> ThreadSlice {
    REDUCER.initial_state()
}

pub fn reduce(state: &ThreadSlice, action: &Action) -> ThreadSlice {
    REDUCER.reduce(Some(state.clone()), action)
}
