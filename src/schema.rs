//! JSON Schema validation for tool arguments.
//!
//! Validation itself is done by `jsonschema`. This module compiles a schema
//! once per tool and reduces the first validation error to a
//! [`SchemaErrorKind`], so callers can tell an argument string that holds a
//! JSON-encoded object (the model double-encoded it) from other failures.

use jsonschema::JSONSchema;
use jsonschema::error::{ValidationError, ValidationErrorKind};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Why a value failed validation, and where.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at {}", display_path(.path))]
pub struct SchemaError {
    /// JSON pointer to the offending value, empty for the root.
    pub path: String,
    pub kind: SchemaErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaErrorKind {
    InvalidJson(String),
    /// The schema itself could not be compiled.
    InvalidSchema(String),
    ExpectedObject,
    MissingProperty(String),
    UnexpectedProperty(String),
    /// Any other keyword failure, described by the validator.
    Invalid(String),
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaErrorKind::InvalidJson(msg) => write!(f, "invalid JSON ({msg})"),
            SchemaErrorKind::InvalidSchema(msg) => write!(f, "invalid schema ({msg})"),
            SchemaErrorKind::ExpectedObject => f.write_str("expected an object"),
            SchemaErrorKind::MissingProperty(name) => write!(f, "missing property \"{name}\""),
            SchemaErrorKind::UnexpectedProperty(name) => {
                write!(f, "unexpected property \"{name}\"")
            }
            SchemaErrorKind::Invalid(msg) => f.write_str(msg),
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "root" } else { path }
}

impl SchemaError {
    fn new(path: impl Into<String>, kind: SchemaErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// True when the top-level value was not an object although the schema
    /// asked for one. A JSON string holding an encoded object fails this way.
    pub fn is_expected_object(&self) -> bool {
        self.path.is_empty() && self.kind == SchemaErrorKind::ExpectedObject
    }
}

/// A compiled schema.
#[derive(Clone)]
pub struct Validator {
    compiled: std::result::Result<Arc<JSONSchema>, String>,
    expects_object: bool,
}

impl Validator {
    /// Compile `schema`. A schema that does not compile is kept as an error
    /// and rejects every value.
    pub fn new(schema: &Value) -> Self {
        let compiled = JSONSchema::compile(schema)
            .map(Arc::new)
            .map_err(|e| e.to_string());
        if let Err(reason) = &compiled {
            warn!(%reason, "schema does not compile");
        }

        Self {
            compiled,
            expects_object: schema.get("type").and_then(Value::as_str) == Some("object"),
        }
    }

    /// Parse a raw argument string and validate it.
    ///
    /// An empty or whitespace-only string parses as `{}`.
    pub fn parse_and_validate(&self, raw: &str) -> Result<Value, SchemaError> {
        let value = if raw.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw)
                .map_err(|e| SchemaError::new("", SchemaErrorKind::InvalidJson(e.to_string())))?
        };
        self.validate(&value)?;
        Ok(value)
    }

    /// Validate `value`, reporting the first error.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        let compiled = self
            .compiled
            .as_ref()
            .map_err(|reason| SchemaError::new("", SchemaErrorKind::InvalidSchema(reason.clone())))?;

        let Err(mut errors) = compiled.validate(value) else {
            return Ok(());
        };
        match errors.next() {
            Some(error) => Err(self.reduce(value, &error)),
            None => Ok(()),
        }
    }

    fn reduce(&self, value: &Value, error: &ValidationError<'_>) -> SchemaError {
        let path = error.instance_path.to_string();
        let kind = match &error.kind {
            ValidationErrorKind::Type { .. }
                if path.is_empty() && self.expects_object && !value.is_object() =>
            {
                SchemaErrorKind::ExpectedObject
            }
            ValidationErrorKind::Required { property } => SchemaErrorKind::MissingProperty(
                property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string()),
            ),
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                SchemaErrorKind::UnexpectedProperty(unexpected.join(", "))
            }
            _ => SchemaErrorKind::Invalid(error.to_string()),
        };
        SchemaError::new(path, kind)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("compiled", &self.compiled.is_ok())
            .field("expects_object", &self.expects_object)
            .finish()
    }
}

/// Compile `schema` and check one raw argument string against it.
pub fn parse_and_validate(schema: &Value, raw: &str) -> Result<Value, SchemaError> {
    Validator::new(schema).parse_and_validate(raw)
}

pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaError> {
    Validator::new(schema).validate(value)
}
