//! The generation effect: one assistant turn per trigger.
//!
//! A turn reads a snapshot of the store, debounces, resolves a model, then
//! streams frames from the selected transport and turns each one into an
//! action. Failed attempts are retried up to `retries` times; a transport
//! error carrying a fallback code excludes the current model and re-resolves
//! instead.
//!
//! Cancellation is a token hierarchy: the effect's teardown token owns one
//! token per run (a newer trigger cancels the older run), and each attempt
//! gets a child of the run token. `dev.stopMessageGeneration` cancels the
//! stop token captured by the run, which is then replaced so the next turn
//! starts clean.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};
use uuid::Uuid;

use super::{ChatStore, noop, runtime};
use crate::actions::{Action, ActionKind, ApiAction, GeneratedMessage, RemoteFailure};
use crate::delta::update_message_with_delta;
use crate::frames::Frame;
use crate::models::api::{self, CompletionCreateParams, ToolChoice};
use crate::reducers::{State, api_messages, api_tools, model_name, should_generate, should_load_thread};
use crate::retry::RetryConfig;
use crate::store::{Action as _, Cleanup};
use crate::translate::{extract_message_delta, to_internal_tool_calls_from_api};
use crate::transport::{
    ModelInput, ModelResolver, RequestedFeatures, ResolvedModel, ResolverConfig, Transport,
    TransportRequest,
};
use crate::{Error, Result};

/// Actions that start a new turn.
pub(crate) const TRIGGERS: &[ActionKind] = &[
    ActionKind::Sizzle,
    ActionKind::SetMessages,
    ActionKind::SendMessage,
    ActionKind::ResendMessages,
    ActionKind::RunToolCallsSuccess,
];

pub(crate) fn generate_message(store: &ChatStore) -> Cleanup {
    let Some(handle) = runtime("generate_message") else {
        return noop();
    };

    let teardown = CancellationToken::new();
    let current: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
    let stop = Arc::new(Mutex::new(CancellationToken::new()));

    let trigger = {
        let store_handle = store.clone();
        let teardown = teardown.clone();
        let current = current.clone();
        let stop = stop.clone();
        store.when(TRIGGERS, move |action: &Action| {
            let run = teardown.child_token();
            if let Some(previous) = current.lock().replace(run.clone()) {
                previous.cancel();
            }
            let stop = stop.lock().clone();
            debug!(trigger = %action.kind(), "generation triggered");
            handle.spawn(run_turn(store_handle.clone(), run, stop));
        })
    };

    let stopper = {
        let stop = stop.clone();
        store.when(&[ActionKind::StopMessageGeneration], move |_: &Action| {
            let mut stop = stop.lock();
            stop.cancel();
            *stop = CancellationToken::new();
        })
    };

    Box::new(move || {
        trigger.unsubscribe();
        stopper.unsubscribe();
        teardown.cancel();
    })
}

/// Everything a turn needs, read once before the debounce.
struct TurnPlan {
    params: CompletionCreateParams,
    features: RequestedFeatures,
    model: ModelInput,
    resolver: ResolverConfig,
    debounce: Duration,
    retries: u32,
    retry: RetryConfig,
}

impl TurnPlan {
    fn from_state(state: &State) -> Option<Self> {
        if !should_generate(state) && !should_load_thread(state) {
            return None;
        }

        let config = &state.config;
        let schema = config.response_schema.clone();
        let emulate = config.emulate_structured_output && schema.is_some();

        let messages = api_messages(state);
        let messages = if config.thread_id.is_some() {
            extract_message_delta(&messages)
        } else {
            messages
        };

        let params = CompletionCreateParams {
            model: model_name(config).unwrap_or_default(),
            system: config.system.clone(),
            messages,
            tools: api_tools(state),
            tool_choice: emulate.then_some(ToolChoice::Required),
            response_format: if config.emulate_structured_output { None } else { schema },
            thread_id: config.thread_id.clone(),
            ui: config.ui,
        };

        Some(Self {
            features: RequestedFeatures {
                tools: !state.tools.is_empty(),
                structured: config.response_schema.is_some(),
                ui: config.ui,
                threads: config.thread_id.is_some(),
            },
            params,
            model: config.model.clone(),
            resolver: ResolverConfig {
                url: config.api_url.clone(),
                middleware: config.middleware.clone(),
                transport: config.transport.clone(),
            },
            debounce: config.debounce,
            retries: config.retries,
            retry: config.retry.clone(),
        })
    }
}

/// How a turn's retry loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Succeeded,
    Failed,
    /// A retryable failure with every retry spent.
    Exhausted,
    Stopped,
    Superseded,
}

#[instrument(name = "generate_message", skip_all, fields(model = tracing::field::Empty))]
async fn run_turn(store: ChatStore, run: CancellationToken, stop: CancellationToken) {
    let _release = run.clone().drop_guard();
    link(&run, stop.clone());

    let Some(plan) = store.read(TurnPlan::from_state) else {
        return;
    };

    if !plan.debounce.is_zero() {
        tokio::select! {
            biased;
            _ = run.cancelled() => {
                debug!("turn cancelled during debounce");
                return;
            }
            _ = sleep(plan.debounce) => {}
        }
    }

    let mut resolver = ModelResolver::new(&plan.model, plan.resolver.clone());
    let selected = tokio::select! {
        biased;
        _ = run.cancelled() => return,
        selected = resolver.select(plan.features) => selected,
    };
    let Some(mut selected) = selected else {
        warn!(skipped = ?resolver.metadata().skipped_specs, "no model available");
        store.dispatch(ApiAction::GenerateMessageError(Arc::new(Error::NoModelAvailable)).into());
        store.dispatch(ApiAction::AssistantTurnFinalized.into());
        return;
    };
    Span::current().record("model", selected.spec.name.as_str());

    let mut attempt = 0u32;
    let mut fallbacks = 0u32;
    let ending = loop {
        let max_attempts = plan.retries + 1 + fallbacks;
        if attempt >= max_attempts {
            break Ending::Exhausted;
        }
        attempt += 1;

        let mut params = plan.params.clone();
        params.model = selected.spec.name.clone();
        let request = TransportRequest {
            params,
            signal: run.child_token(),
            attempt,
            max_attempts,
            request_id: Uuid::new_v4().to_string(),
        };

        let error = match stream_attempt(&store, &selected.transport, request).await {
            Ok(()) => break Ending::Succeeded,
            Err(error) => error,
        };

        if run.is_cancelled() {
            break if stop.is_cancelled() {
                Ending::Stopped
            } else {
                Ending::Superseded
            };
        }

        let error = Arc::new(error);
        warn!(attempt, max_attempts, error = %error, "generation attempt failed");
        store.dispatch(ApiAction::GenerateMessageError(error.clone()).into());

        if error.fallback_code().is_some() {
            match reselect(&mut resolver, &selected, &error, plan.features).await {
                Some(next) => {
                    info!(from = %selected.spec.name, to = %next.spec.name, "falling back to next model");
                    selected = next;
                    fallbacks += 1;
                    continue;
                }
                None => break Ending::Failed,
            }
        }

        if !error.is_retryable() {
            break Ending::Failed;
        }

        if attempt < max_attempts && !plan.retry.wait(attempt - 1, &run).await {
            break if stop.is_cancelled() {
                Ending::Stopped
            } else {
                Ending::Superseded
            };
        }
    };

    debug!(?ending, attempt, "turn ended");
    if ending == Ending::Superseded {
        // the superseding run owns the turn from here
        return;
    }

    store.dispatch(ApiAction::AssistantTurnFinalized.into());
    if plan.retries > 0 && ending == Ending::Exhausted {
        store.dispatch(ApiAction::GenerateMessageExhaustedRetries.into());
    }
}

/// Cancel `run` when `stop` fires. The watcher exits with the run.
fn link(run: &CancellationToken, stop: CancellationToken) {
    let run = run.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = stop.cancelled() => run.cancel(),
            _ = run.cancelled() => {}
        }
    });
}

async fn reselect(
    resolver: &mut ModelResolver,
    failed: &ResolvedModel,
    error: &Error,
    features: RequestedFeatures,
) -> Option<ResolvedModel> {
    resolver.skip_from_error(&failed.spec, error);
    resolver.select(features).await
}

/// One attempt: send, then turn every frame into an action until the stream
/// ends. The response's resources are released on every exit path.
#[instrument(
    skip_all,
    fields(attempt = request.attempt, max_attempts = request.max_attempts, request_id = %request.request_id)
)]
async fn stream_attempt(
    store: &ChatStore,
    transport: &Arc<dyn Transport>,
    request: TransportRequest,
) -> Result<()> {
    let signal = request.signal.clone();
    let response = tokio::select! {
        biased;
        _ = signal.cancelled() => return Err(Error::Cancelled),
        response = transport.send(request) => response?,
    };
    let (mut frames, _dispose) = response.into_frames();

    let mut message: Option<api::AssistantMessage> = None;
    let mut generating = false;
    let mut finished = false;

    loop {
        let frame = tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(Error::Cancelled),
            frame = frames.next() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        match frame? {
            Frame::ThreadLoadStart => store.dispatch(ApiAction::ThreadLoadStart.into()),
            Frame::ThreadLoadSuccess { thread } => {
                store.dispatch(ApiAction::ThreadLoadSuccess { thread }.into())
            }
            Frame::ThreadLoadFailure { error, stacktrace } => store.dispatch(
                ApiAction::ThreadLoadFailure(RemoteFailure { error, stacktrace }).into(),
            ),
            Frame::ThreadSaveStart => store.dispatch(ApiAction::ThreadSaveStart.into()),
            Frame::ThreadSaveSuccess { thread_id } => {
                store.dispatch(ApiAction::ThreadSaveSuccess { thread_id }.into())
            }
            Frame::ThreadSaveFailure { error, stacktrace } => store.dispatch(
                ApiAction::ThreadSaveFailure(RemoteFailure { error, stacktrace }).into(),
            ),
            Frame::GenerationStart => {
                generating = true;
                store.dispatch(ApiAction::GenerateMessageStart.into());
            }
            Frame::GenerationChunk { chunk } => {
                generating = true;
                message = update_message_with_delta(message.take(), &chunk);
                if let Some(snapshot) = &message {
                    store.dispatch(ApiAction::GenerateMessageChunk(snapshot.clone()).into());
                }
            }
            Frame::GenerationError { error } => return Err(Error::generation(error)),
            Frame::GenerationFinish => {
                store.dispatch(ApiAction::GenerateMessageFinish.into());
                let Some(done) = message.take() else {
                    return Err(Error::NoMessageGenerated);
                };
                let tool_calls = to_internal_tool_calls_from_api(&done.tool_calls);
                debug!(tool_calls = tool_calls.len(), "message generated");
                store.dispatch(
                    ApiAction::GenerateMessageSuccess(GeneratedMessage {
                        message: done,
                        tool_calls,
                    })
                    .into(),
                );
                generating = false;
                finished = true;
            }
        }
    }

    if generating && !finished {
        return Err(Error::stream("stream ended before generation finished"));
    }
    Ok(())
}
