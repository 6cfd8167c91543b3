//! Configuration slice: everything the generation effect reads to build and
//! route a request.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::{Action, ApiAction, DevAction};
use crate::middleware::Middleware;
use crate::retry::RetryConfig;
use crate::transport::{ModelInput, Transport};

/// Debounce applied before each generation request unless configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

#[derive(Clone)]
pub struct ConfigState {
    pub api_url: Option<String>,
    pub model: ModelInput,
    pub system: String,
    pub debounce: Duration,
    pub response_schema: Option<Value>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub emulate_structured_output: bool,
    pub retries: u32,
    pub retry: RetryConfig,
    pub transport: Option<Arc<dyn Transport>>,
    pub ui: bool,
    pub thread_id: Option<String>,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self {
            api_url: None,
            model: ModelInput::default(),
            system: String::new(),
            debounce: DEFAULT_DEBOUNCE,
            response_schema: None,
            middleware: Vec::new(),
            emulate_structured_output: false,
            retries: 0,
            retry: RetryConfig::default(),
            transport: None,
            ui: false,
            thread_id: None,
        }
    }
}

impl fmt::Debug for ConfigState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigState")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("system", &self.system)
            .field("debounce", &self.debounce)
            .field("response_schema", &self.response_schema)
            .field("middleware", &self.middleware.len())
            .field("emulate_structured_output", &self.emulate_structured_output)
            .field("retries", &self.retries)
            .field("retry", &self.retry)
            .field("transport", &self.transport.is_some())
            .field("ui", &self.ui)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

/// Primary model name, used as `model` in the request body.
pub fn model_name(config: &ConfigState) -> Option<String> {
    use crate::transport::ModelCandidate;
    config.model.candidates().iter().find_map(|candidate| match candidate {
        ModelCandidate::Name(name) => Some(name.clone()),
        ModelCandidate::Spec(spec) => Some(spec.name.clone()),
        ModelCandidate::Factory(_) => None,
    })
}

pub fn reduce(state: &Arc<ConfigState>, action: &Action) -> Arc<ConfigState> {
    match action {
        Action::Dev(DevAction::Init(init)) => Arc::new(init.config.clone()),
        Action::Dev(DevAction::UpdateOptions(update)) => {
            let mut next = ConfigState::clone(state);
            update.apply_to(&mut next);
            Arc::new(next)
        }
        Action::Api(ApiAction::ThreadSaveSuccess { thread_id }) => Arc::new(ConfigState {
            thread_id: Some(thread_id.clone()),
            ..ConfigState::clone(state)
        }),
        _ => state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionsUpdate;

    #[test]
    fn test_defaults() {
        let config = ConfigState::default();
        assert_eq!(config.debounce, Duration::from_millis(150));
        assert_eq!(config.retries, 0);
        assert!(!config.emulate_structured_output);
        assert!(!config.ui);
    }

    #[test]
    fn test_update_merges_and_keeps_thread_id() {
        let state = Arc::new(ConfigState {
            thread_id: Some("t1".into()),
            ..Default::default()
        });

        let update = OptionsUpdate {
            system: Some("be brief".into()),
            retries: Some(2),
            ..Default::default()
        };
        let next = reduce(&state, &DevAction::UpdateOptions(Arc::new(update)).into());
        assert_eq!(next.system, "be brief");
        assert_eq!(next.retries, 2);
        assert_eq!(next.thread_id.as_deref(), Some("t1"));

        let clear = OptionsUpdate {
            thread_id: Some(None),
            ..Default::default()
        };
        let next = reduce(&next, &DevAction::UpdateOptions(Arc::new(clear)).into());
        assert_eq!(next.thread_id, None);
    }

    #[test]
    fn test_thread_save_adopts_id() {
        let state = Arc::new(ConfigState::default());
        let next = reduce(
            &state,
            &ApiAction::ThreadSaveSuccess {
                thread_id: "t9".into(),
            }
            .into(),
        );
        assert_eq!(next.thread_id.as_deref(), Some("t9"));
    }

    #[test]
    fn test_unrelated_action_keeps_identity() {
        let state = Arc::new(ConfigState::default());
        let next = reduce(&state, &ApiAction::GenerateMessageStart.into());
        assert!(Arc::ptr_eq(&state, &next));
    }
}
