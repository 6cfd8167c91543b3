//! Error types for the chat engine

use std::fmt;
use thiserror::Error;

use crate::schema::SchemaError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failure reported by a transport
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Streaming error (malformed or truncated frames)
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Tool arguments did not match the tool's schema
    #[error("Schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The resolver had no model able to serve the request
    #[error("No model available for the requested features")]
    NoModelAvailable,

    /// The stream finished without producing an assistant message
    #[error("No message was generated")]
    NoMessageGenerated,

    /// The backend reported a `generation-error` frame
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Work was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new generation error
    pub fn generation(msg: impl Into<String>) -> Self {
        Error::Generation(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Whether another attempt may succeed.
    ///
    /// Decided from the error's kind and flags only, never from message text.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(err) => err.retryable,
            Error::Http(_) => true,
            Error::Stream(_) => true,
            Error::Json(_) => true,
            Error::Generation(_) => true,
            Error::Other(_) => true,
            Error::Config(_)
            | Error::Tool(_)
            | Error::Schema(_)
            | Error::InvalidInput(_)
            | Error::NoModelAvailable
            | Error::NoMessageGenerated
            | Error::Cancelled => false,
        }
    }

    /// The code that should make the resolver skip the current model, if any.
    pub fn fallback_code(&self) -> Option<&TransportErrorCode> {
        match self {
            Error::Transport(err) => err.code.as_ref().filter(|code| code.triggers_fallback()),
            _ => None,
        }
    }
}

/// Machine-readable reason attached to a [`TransportError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorCode {
    FeatureUnsupported,
    PlatformUnsupported,
    ModelUnavailable,
    Other(String),
}

impl TransportErrorCode {
    /// FEATURE_UNSUPPORTED and PLATFORM_UNSUPPORTED make the resolver move on.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            TransportErrorCode::FeatureUnsupported | TransportErrorCode::PlatformUnsupported
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransportErrorCode::FeatureUnsupported => "FEATURE_UNSUPPORTED",
            TransportErrorCode::PlatformUnsupported => "PLATFORM_UNSUPPORTED",
            TransportErrorCode::ModelUnavailable => "MODEL_UNAVAILABLE",
            TransportErrorCode::Other(code) => code,
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a transport while sending a request or reading its reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transport error: {message}")]
pub struct TransportError {
    pub message: String,
    pub retryable: bool,
    pub code: Option<TransportErrorCode>,
    pub status: Option<u16>,
}

impl TransportError {
    /// A retryable error with no code
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            code: None,
            status: None,
        }
    }

    /// A fatal error with no code
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            code: None,
            status: None,
        }
    }

    pub fn with_code(mut self, code: TransportErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("Invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model");
    }

    #[test]
    fn test_error_stream() {
        let err = Error::stream("Connection lost");
        assert!(matches!(err, Error::Stream(_)));
        assert_eq!(err.to_string(), "Streaming error: Connection lost");
    }

    #[test]
    fn test_error_tool() {
        let err = Error::tool("Tool not found");
        assert_eq!(err.to_string(), "Tool execution error: Tool not found");
    }

    #[test]
    fn test_no_message_generated_text() {
        assert_eq!(
            Error::NoMessageGenerated.to_string(),
            "No message was generated"
        );
    }

    #[test]
    fn test_transport_error_display() {
        let err: Error = TransportError::retryable("temporary boom").into();
        assert_eq!(err.to_string(), "Transport error: temporary boom");
    }

    #[test]
    fn test_retryable_follows_transport_flag() {
        assert!(Error::from(TransportError::retryable("x")).is_retryable());
        assert!(!Error::from(TransportError::fatal("x")).is_retryable());
        assert!(Error::generation("model crashed").is_retryable());
        assert!(!Error::NoMessageGenerated.is_retryable());
        assert!(!Error::config("bad").is_retryable());
    }

    #[test]
    fn test_fallback_code_only_for_unsupported() {
        let feature: Error = TransportError::fatal("no tools")
            .with_code(TransportErrorCode::FeatureUnsupported)
            .into();
        assert_eq!(
            feature.fallback_code(),
            Some(&TransportErrorCode::FeatureUnsupported)
        );

        let unavailable: Error = TransportError::fatal("down")
            .with_code(TransportErrorCode::ModelUnavailable)
            .into();
        assert_eq!(unavailable.fallback_code(), None);

        assert_eq!(Error::generation("x").fallback_code(), None);
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_code_display() {
        assert_eq!(
            TransportErrorCode::PlatformUnsupported.to_string(),
            "PLATFORM_UNSUPPORTED"
        );
        assert_eq!(TransportErrorCode::Other("RATE".into()).to_string(), "RATE");
    }
}
