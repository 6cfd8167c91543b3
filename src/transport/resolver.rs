//! Model selection with capability gating, platform probes and fallback.
//!
//! A [`ModelResolver`] walks its candidates in order and returns the first
//! one that supports the requested features and whose optional detect probe
//! passes. Candidates that fail are remembered as skipped for the rest of the
//! resolver's life, so a later [`ModelResolver::select`] moves on to the next
//! one. [`ModelResolver::skip_from_error`] does the same for a model whose
//! transport reported `FEATURE_UNSUPPORTED` or `PLATFORM_UNSUPPORTED`.

use async_trait::async_trait;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{HttpTransport, Transport};
use crate::middleware::Middleware;
use crate::{Error, Result, TransportErrorCode};

/// Features a request needs from the model that serves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestedFeatures {
    pub tools: bool,
    pub structured: bool,
    pub ui: bool,
    pub threads: bool,
}

/// What a model supports. `None` means "not declared" and never blocks
/// selection; only an explicit `Some(false)` does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub tools: Option<bool>,
    pub structured: Option<bool>,
    pub ui: Option<bool>,
    pub threads: Option<bool>,
}

impl ModelCapabilities {
    pub fn all() -> Self {
        Self {
            tools: Some(true),
            structured: Some(true),
            ui: Some(true),
            threads: Some(true),
        }
    }

    fn failure(&self, features: &RequestedFeatures) -> Option<&'static str> {
        if features.tools && self.tools == Some(false) {
            return Some("tools requested but not supported");
        }
        if features.structured && self.structured == Some(false) {
            return Some("structured output requested but not supported");
        }
        if features.ui && self.ui == Some(false) {
            return Some("ui output requested but not supported");
        }
        if features.threads && self.threads == Some(false) {
            return Some("threads requested but not supported");
        }
        None
    }
}

/// Outcome of a platform probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionResult {
    Supported,
    Unsupported {
        code: TransportErrorCode,
        reason: Option<String>,
    },
}

/// Probe run before a model is chosen, e.g. to check that a local runtime is
/// reachable.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self) -> Result<DetectionResult>;
}

/// A named model bound to the transport that reaches it.
#[derive(Clone)]
pub struct ModelSpec {
    pub name: String,
    pub transport: Arc<dyn Transport>,
    pub capabilities: ModelCapabilities,
    pub detect: Option<Arc<dyn Detector>>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            capabilities: ModelCapabilities::default(),
            detect: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detect = Some(detector);
        self
    }
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("detect", &self.detect.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds a spec from the resolver's configuration.
pub type ModelSpecFactory = Arc<dyn Fn(&ResolverConfig) -> Option<ModelSpec> + Send + Sync>;

/// One entry of a model preference list.
#[derive(Clone)]
pub enum ModelCandidate {
    /// A model id served by the configured transport.
    Name(String),
    Spec(ModelSpec),
    Factory(ModelSpecFactory),
}

impl fmt::Debug for ModelCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelCandidate::Name(name) => f.debug_tuple("Name").field(name).finish(),
            ModelCandidate::Spec(spec) => f.debug_tuple("Spec").field(&spec.name).finish(),
            ModelCandidate::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Ordered model preferences, most preferred first.
#[derive(Debug, Clone, Default)]
pub struct ModelInput(Vec<ModelCandidate>);

impl ModelInput {
    pub fn new(candidates: Vec<ModelCandidate>) -> Self {
        Self(candidates)
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add a lower-priority candidate.
    pub fn or(mut self, candidate: impl Into<ModelInput>) -> Self {
        self.0.extend(candidate.into().0);
        self
    }
}

impl From<&str> for ModelInput {
    fn from(name: &str) -> Self {
        Self(vec![ModelCandidate::Name(name.to_string())])
    }
}

impl From<String> for ModelInput {
    fn from(name: String) -> Self {
        Self(vec![ModelCandidate::Name(name)])
    }
}

impl From<ModelSpec> for ModelInput {
    fn from(spec: ModelSpec) -> Self {
        Self(vec![ModelCandidate::Spec(spec)])
    }
}

impl From<Vec<ModelCandidate>> for ModelInput {
    fn from(candidates: Vec<ModelCandidate>) -> Self {
        Self(candidates)
    }
}

impl From<Vec<&str>> for ModelInput {
    fn from(names: Vec<&str>) -> Self {
        Self(
            names
                .into_iter()
                .map(|name| ModelCandidate::Name(name.to_string()))
                .collect(),
        )
    }
}

/// Settings used to materialize name candidates.
#[derive(Clone, Default)]
pub struct ResolverConfig {
    pub url: Option<String>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    /// Transport for name candidates; overrides `url`.
    pub transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("url", &self.url)
            .field("middleware", &self.middleware.len())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FeatureUnsupported,
    PlatformUnsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSpec {
    pub name: String,
    pub reason: SkipReason,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSelectionMetadata {
    pub chosen_spec: Option<String>,
    pub skipped_specs: Vec<SkippedSpec>,
}

/// A selected model and the transport to reach it.
#[derive(Clone)]
pub struct ResolvedModel {
    pub spec: ModelSpec,
    pub transport: Arc<dyn Transport>,
    pub metadata: ModelSelectionMetadata,
}

impl fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("spec", &self.spec)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

pub struct ModelResolver {
    candidates: Vec<ModelCandidate>,
    config: ResolverConfig,
    skipped: Vec<SkippedSpec>,
    chosen: Option<String>,
}

impl ModelResolver {
    pub fn new(model: &ModelInput, config: ResolverConfig) -> Self {
        Self {
            candidates: model.candidates().to_vec(),
            config,
            skipped: Vec::new(),
            chosen: None,
        }
    }

    /// Pick the first eligible candidate for `features`.
    pub async fn select(&mut self, features: RequestedFeatures) -> Option<ResolvedModel> {
        for candidate in self.candidates.clone() {
            let Some(spec) = self.materialize(&candidate) else {
                continue;
            };

            if self.is_skipped(&spec.name) {
                continue;
            }

            if let Some(reason) = spec.capabilities.failure(&features) {
                debug!(model = %spec.name, reason, "model skipped");
                self.skip(&spec.name, SkipReason::FeatureUnsupported, Some(reason.to_string()));
                continue;
            }

            if let Some(details) = run_detection(&spec).await {
                debug!(model = %spec.name, %details, "model failed detection");
                self.skip(&spec.name, SkipReason::PlatformUnsupported, Some(details));
                continue;
            }

            self.chosen = Some(spec.name.clone());
            return Some(ResolvedModel {
                transport: spec.transport.clone(),
                metadata: self.metadata(),
                spec,
            });
        }

        None
    }

    /// Exclude `spec` after its transport reported a fallback code. Other
    /// errors are ignored.
    pub fn skip_from_error(&mut self, spec: &ModelSpec, error: &Error) {
        let reason = match error.fallback_code() {
            Some(TransportErrorCode::FeatureUnsupported) => SkipReason::FeatureUnsupported,
            Some(TransportErrorCode::PlatformUnsupported) => SkipReason::PlatformUnsupported,
            _ => return,
        };
        let details = match error {
            Error::Transport(err) => err.message.clone(),
            other => other.to_string(),
        };
        self.skip(&spec.name, reason, Some(details));
    }

    pub fn metadata(&self) -> ModelSelectionMetadata {
        ModelSelectionMetadata {
            chosen_spec: self.chosen.clone(),
            skipped_specs: self.skipped.clone(),
        }
    }

    fn is_skipped(&self, name: &str) -> bool {
        self.skipped.iter().any(|s| s.name == name)
    }

    fn skip(&mut self, name: &str, reason: SkipReason, details: Option<String>) {
        let entry = SkippedSpec {
            name: name.to_string(),
            reason,
            details,
        };
        match self.skipped.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = entry,
            None => self.skipped.push(entry),
        }
    }

    fn materialize(&self, candidate: &ModelCandidate) -> Option<ModelSpec> {
        match candidate {
            ModelCandidate::Spec(spec) => Some(spec.clone()),
            ModelCandidate::Factory(factory) => factory(&self.config),
            ModelCandidate::Name(name) => {
                let transport = self.default_transport()?;
                Some(ModelSpec::new(name.clone(), transport).with_capabilities(ModelCapabilities::all()))
            }
        }
    }

    fn default_transport(&self) -> Option<Arc<dyn Transport>> {
        if let Some(transport) = &self.config.transport {
            return Some(transport.clone());
        }

        match self.config.url.as_deref() {
            Some(url) if !url.is_empty() => Some(Arc::new(
                HttpTransport::new(url).with_middleware(self.config.middleware.clone()),
            )),
            _ => {
                warn!("no url provided for the default transport; named models will be skipped");
                None
            }
        }
    }
}

impl fmt::Debug for ModelResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelResolver")
            .field("candidates", &self.candidates)
            .field("config", &self.config)
            .field("skipped", &self.skipped)
            .finish()
    }
}

/// `None` when the spec may be used, otherwise why not.
async fn run_detection(spec: &ModelSpec) -> Option<String> {
    let detector = spec.detect.as_ref()?;
    match AssertUnwindSafe(detector.detect()).catch_unwind().await {
        Ok(Ok(DetectionResult::Supported)) => None,
        Ok(Ok(DetectionResult::Unsupported { code, reason })) => {
            Some(reason.unwrap_or_else(|| code.to_string()))
        }
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("Detection failed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportError;
    use crate::transport::{TransportRequest, TransportResponse};

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse> {
            Ok(TransportResponse::from_frames(vec![]))
        }
    }

    struct Probe(DetectionResult);

    #[async_trait]
    impl Detector for Probe {
        async fn detect(&self) -> Result<DetectionResult> {
            Ok(self.0.clone())
        }
    }

    struct PanickingProbe;

    #[async_trait]
    impl Detector for PanickingProbe {
        async fn detect(&self) -> Result<DetectionResult> {
            panic!("probe exploded")
        }
    }

    fn spec(name: &str) -> ModelSpec {
        ModelSpec::new(name, Arc::new(NullTransport))
    }

    fn tools() -> RequestedFeatures {
        RequestedFeatures {
            tools: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_names_need_a_transport() {
        let mut resolver = ModelResolver::new(&"gpt".into(), ResolverConfig::default());
        assert!(resolver.select(RequestedFeatures::default()).await.is_none());

        let mut resolver = ModelResolver::new(
            &"gpt".into(),
            ResolverConfig {
                url: Some("http://localhost/chat".into()),
                ..Default::default()
            },
        );
        let resolved = resolver.select(tools()).await.unwrap();
        assert_eq!(resolved.spec.name, "gpt");
        assert_eq!(resolved.metadata.chosen_spec.as_deref(), Some("gpt"));
    }

    #[tokio::test]
    async fn test_capability_gating() {
        let no_tools = spec("small").with_capabilities(ModelCapabilities {
            tools: Some(false),
            ..Default::default()
        });
        let input = ModelInput::from(no_tools).or(spec("large"));
        let mut resolver = ModelResolver::new(&input, ResolverConfig::default());

        let resolved = resolver.select(tools()).await.unwrap();
        assert_eq!(resolved.spec.name, "large");
        assert_eq!(
            resolved.metadata.skipped_specs,
            vec![SkippedSpec {
                name: "small".into(),
                reason: SkipReason::FeatureUnsupported,
                details: Some("tools requested but not supported".into()),
            }]
        );
    }

    #[tokio::test]
    async fn test_detection_failures_skip() {
        let unavailable = spec("local").with_detector(Arc::new(Probe(DetectionResult::Unsupported {
            code: TransportErrorCode::ModelUnavailable,
            reason: None,
        })));
        let exploding = spec("flaky").with_detector(Arc::new(PanickingProbe));
        let input = ModelInput::new(vec![
            ModelCandidate::Spec(unavailable),
            ModelCandidate::Spec(exploding),
            ModelCandidate::Spec(spec("remote")),
        ]);
        let mut resolver = ModelResolver::new(&input, ResolverConfig::default());

        let resolved = resolver.select(RequestedFeatures::default()).await.unwrap();
        assert_eq!(resolved.spec.name, "remote");

        let skipped = resolver.metadata().skipped_specs;
        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().all(|s| s.reason == SkipReason::PlatformUnsupported));
        assert_eq!(skipped[0].details.as_deref(), Some("MODEL_UNAVAILABLE"));
        assert_eq!(skipped[1].details.as_deref(), Some("Detection failed"));
    }

    #[tokio::test]
    async fn test_skip_from_error_moves_on() {
        let input = ModelInput::new(vec![
            ModelCandidate::Spec(spec("primary")),
            ModelCandidate::Spec(spec("backup")),
        ]);
        let mut resolver = ModelResolver::new(&input, ResolverConfig::default());
        let first = resolver.select(tools()).await.unwrap();
        assert_eq!(first.spec.name, "primary");

        resolver.skip_from_error(&first.spec, &Error::generation("transient"));
        assert_eq!(resolver.select(tools()).await.unwrap().spec.name, "primary");

        let unsupported: Error = TransportError::fatal("no tools here")
            .with_code(TransportErrorCode::FeatureUnsupported)
            .into();
        resolver.skip_from_error(&first.spec, &unsupported);
        assert_eq!(resolver.select(tools()).await.unwrap().spec.name, "backup");

        resolver.skip_from_error(&spec("backup"), &unsupported);
        assert!(resolver.select(tools()).await.is_none());
    }

    #[tokio::test]
    async fn test_factory_receives_config() {
        let factory: ModelSpecFactory = Arc::new(|config: &ResolverConfig| {
            config.url.as_ref().map(|url| spec(&format!("factory@{url}")))
        });
        let input = ModelInput::new(vec![ModelCandidate::Factory(factory)]);
        let mut resolver = ModelResolver::new(
            &input,
            ResolverConfig {
                url: Some("local".into()),
                ..Default::default()
            },
        );
        assert_eq!(
            resolver.select(RequestedFeatures::default()).await.unwrap().spec.name,
            "factory@local"
        );
    }
}
