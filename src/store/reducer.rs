//! Action routing and reducer composition.

use std::fmt::Debug;
use std::hash::Hash;

/// A dispatchable action.
///
/// Actions are closed enums; [`Action::kind`] projects the fieldless routing
/// key that listeners and reducers match on.
pub trait Action: Clone + Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type Handler<S, A> = Box<dyn Fn(S, &A) -> S + Send + Sync>;

/// A handler that only runs for the listed action kinds.
pub struct On<S, A: Action> {
    kinds: Vec<A::Kind>,
    handler: Handler<S, A>,
}

impl<S, A: Action> On<S, A> {
    /// Run the handler when `action` matches, otherwise pass `state` through.
    pub fn apply(&self, state: S, action: &A) -> S {
        if self.kinds.contains(&action.kind()) {
            (self.handler)(state, action)
        } else {
            state
        }
    }
}

/// Register `handler` for the given action kinds.
pub fn on<S, A, F>(kinds: &[A::Kind], handler: F) -> On<S, A>
where
    A: Action,
    F: Fn(S, &A) -> S + Send + Sync + 'static,
{
    On {
        kinds: kinds.to_vec(),
        handler: Box::new(handler),
    }
}

/// A slice reducer assembled from [`on`] handlers.
pub struct Reducer<S, A: Action> {
    initial: S,
    ons: Vec<On<S, A>>,
}

/// Fold an action through each handler in order, starting from `initial`
/// when no state exists yet.
pub fn create_reducer<S: Clone, A: Action>(initial: S, ons: Vec<On<S, A>>) -> Reducer<S, A> {
    Reducer { initial, ons }
}

impl<S: Clone, A: Action> Reducer<S, A> {
    pub fn initial_state(&self) -> S {
        self.initial.clone()
    }

    pub fn reduce(&self, state: Option<S>, action: &A) -> S {
        let state = state.unwrap_or_else(|| self.initial.clone());
        self.ons.iter().fold(state, |state, on| on.apply(state, action))
    }
}
