//! The tool-execution effect.
//!
//! After a generation succeeds with pending tool calls, every pending call
//! runs concurrently and each settles on its own: a missing tool, invalid
//! arguments or a failing handler rejects that call only. Once all calls
//! have settled a single `runToolCallsSuccess` carries every outcome.

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{ChatStore, noop, runtime};
use crate::actions::{Action, ActionKind, ApiAction, InternalAction};
use crate::models::internal::ToolCall;
use crate::models::{ToolOutcome, api};
use crate::reducers::pending_tool_calls;
use crate::store::{Cleanup, EntityState};
use crate::tools::Tool;
use crate::{Error, Result};

pub(crate) fn run_tool_calls(store: &ChatStore) -> Cleanup {
    let Some(handle) = runtime("run_tool_calls") else {
        return noop();
    };

    let teardown = CancellationToken::new();
    let batch: Arc<Mutex<Option<CancellationToken>>> = Arc::default();

    let on_success = {
        let store_handle = store.clone();
        let teardown = teardown.clone();
        let batch = batch.clone();
        store.when(&[ActionKind::GenerateMessageSuccess], move |action: &Action| {
            let Action::Api(ApiAction::GenerateMessageSuccess(generated)) = action else {
                return;
            };
            // only the calls this message requested; older pending calls stay put
            let (calls, tools) = store_handle.read(|state| {
                let calls: Vec<Arc<ToolCall>> = pending_tool_calls(state)
                    .into_iter()
                    .filter(|call| generated.tool_calls.iter().any(|requested| requested.id == call.id))
                    .collect();
                (calls, state.tools.clone())
            });
            if calls.is_empty() {
                return;
            }

            let cancel = teardown.child_token();
            *batch.lock() = Some(cancel.clone());
            handle.spawn(run_batch(store_handle.clone(), calls, tools, cancel));
        })
    };

    let on_stop = {
        let batch = batch.clone();
        store.when(&[ActionKind::StopMessageGeneration], move |_: &Action| {
            if let Some(cancel) = batch.lock().take() {
                cancel.cancel();
            }
        })
    };

    Box::new(move || {
        on_success.unsubscribe();
        on_stop.unsubscribe();
        teardown.cancel();
    })
}

#[instrument(skip_all, fields(calls = calls.len()))]
async fn run_batch(
    store: ChatStore,
    calls: Vec<Arc<ToolCall>>,
    tools: Arc<EntityState<Tool>>,
    cancel: CancellationToken,
) {
    let settled = join_all(
        calls
            .iter()
            .map(|call| settle(call, tools.get(&call.name).cloned(), cancel.clone())),
    );

    let tool_messages = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("tool batch cancelled");
            store.dispatch(InternalAction::RunToolCallsError(Arc::new(Error::Cancelled)).into());
            return;
        }
        messages = settled => messages,
    };

    debug!(
        fulfilled = tool_messages.iter().filter(|m| m.content.is_fulfilled()).count(),
        "tool batch settled"
    );
    store.dispatch(InternalAction::RunToolCallsSuccess { tool_messages }.into());
}

async fn settle(call: &ToolCall, tool: Option<Arc<Tool>>, cancel: CancellationToken) -> api::ToolMessage {
    let content = match invoke(call, tool, cancel).await {
        Ok(value) => ToolOutcome::fulfilled(value),
        Err(error) => {
            warn!(tool = %call.name, call_id = %call.id, %error, "tool call rejected");
            ToolOutcome::rejected(&error)
        }
    };

    api::ToolMessage {
        content,
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
    }
}

async fn invoke(call: &ToolCall, tool: Option<Arc<Tool>>, cancel: CancellationToken) -> Result<Value> {
    let tool = tool.ok_or_else(|| Error::tool(format!("tool \"{}\" is not registered", call.name)))?;
    let arguments = parse_arguments(&tool, &call.arguments)?;
    tool.invoke(arguments, cancel).await
}

/// Validate the raw argument string, unwrapping one level of JSON string
/// encoding when the model sent the object double-encoded.
fn parse_arguments(tool: &Tool, raw: &str) -> Result<Value> {
    match tool.parse_arguments(raw) {
        Ok(arguments) => Ok(arguments),
        Err(error) if error.is_expected_object() => {
            let Ok(inner) = serde_json::from_str::<String>(raw) else {
                return Err(error.into());
            };
            Ok(tool.parse_arguments(&inner)?)
        }
        Err(error) => Err(error.into()),
    }
}
