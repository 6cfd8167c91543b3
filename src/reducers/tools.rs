//! Registered tools, keyed by name.

use std::sync::{Arc, LazyLock};

use crate::actions::{Action, ActionKind, DevAction};
use crate::store::{EntityState, Reducer, create_reducer, on};
use crate::tools::Tool;

pub type ToolsState = Arc<EntityState<Tool>>;

static REDUCER: LazyLock<Reducer<ToolsState, Action>> = LazyLock::new(|| {
    create_reducer(
        Arc::default(),
        vec![
            on(&[ActionKind::Init], |state: ToolsState, action: &Action| match action {
                Action::Dev(DevAction::Init(init)) => {
                    Arc::new(EntityState::set_all(init.tools.iter().cloned()))
                }
                _ => state,
            }),
            on(&[ActionKind::UpdateOptions], |state: ToolsState, action: &Action| {
                match action {
                    Action::Dev(DevAction::UpdateOptions(update)) => match &update.tools {
                        Some(tools) => Arc::new(EntityState::set_all(tools.iter().cloned())),
                        None => state,
                    },
                    _ => state,
                }
            }),
        ],
    )
});

pub fn initial_state() -> ToolsState {
    REDUCER.initial_state()
}

pub fn reduce(state: &ToolsState, action: &Action) -> ToolsState {
    REDUCER.reduce(Some(state.clone()), action)
}
