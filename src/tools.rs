//! Tool definitions the model may call.
//!
//! A [`Tool`] pairs a name, a description and a JSON Schema for its
//! arguments with an async handler. The tool-execution effect validates the
//! model's argument string against the schema before invoking the handler,
//! and passes a [`CancellationToken`] that fires when the store is torn down
//! or the user stops generation.
//!
//! # Schema notation
//!
//! Schemas may be written in full JSON Schema or in a compact notation that
//! is expanded on construction:
//!
//! ```text
//! {"city": "string", "days": "int"}
//!     ↓
//! {"type": "object",
//!  "properties": {"city": {"type": "string"}, "days": {"type": "integer"}},
//!  "required": ["city", "days"]}
//! ```
//!
//! Per-property objects may carry `"optional": true`, `"required": false` or
//! a `"default"` to leave the property out of `required`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chat_engine::tool;
//! use serde_json::json;
//!
//! let add = tool("add", "Add two numbers")
//!     .param("a", "number")
//!     .param("b", "number")
//!     .build(|args, _cancel| async move {
//!         let a = args["a"].as_f64().unwrap_or(0.0);
//!         let b = args["b"].as_f64().unwrap_or(0.0);
//!         Ok(json!(a + b))
//!     });
//! assert_eq!(add.name(), "add");
//! ```

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::models::api;
use crate::schema::{SchemaError, Validator};
use crate::store::Entity;

/// Async tool implementation, shared behind an `Arc` so tools clone cheaply.
pub type ToolHandler = Arc<
    dyn Fn(Value, CancellationToken) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        + Send
        + Sync,
>;

/// A callable tool offered to the model.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    schema: Value,
    validator: Validator,
    handler: ToolHandler,
}

impl Tool {
    /// Create a tool. `schema` may use the compact notation described in the
    /// module docs.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let schema = normalize_schema(schema);
        Self {
            name: name.into(),
            description: description.into(),
            validator: Validator::new(&schema),
            schema,
            handler: Arc::new(move |args, cancel| Box::pin(handler(args, cancel))),
        }
    }

    /// Run the handler with already-validated arguments.
    pub async fn invoke(&self, arguments: Value, cancel: CancellationToken) -> Result<Value> {
        (self.handler)(arguments, cancel).await
    }

    /// Parse a raw argument string and check it against the schema.
    pub fn parse_arguments(&self, raw: &str) -> std::result::Result<Value, SchemaError> {
        self.validator.parse_and_validate(raw)
    }

    /// The wire shape sent in a completion request.
    pub fn to_api_tool(&self) -> api::Tool {
        api::Tool {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.schema.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Tools are keyed by name in the store; a patch replaces the definition.
impl Entity for Tool {
    type Patch = Tool;

    fn id(&self) -> &str {
        &self.name
    }

    fn merge(&self, patch: &Tool) -> Self {
        patch.clone()
    }
}

/// Expand compact schema notation into JSON Schema.
///
/// Values that already look like a full schema (an object with `type` and
/// `properties`) pass through untouched. Anything that is not an object
/// becomes an empty object schema.
fn normalize_schema(schema: Value) -> Value {
    let Value::Object(obj) = schema else {
        return serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        });
    };

    if obj.contains_key("type") && obj.contains_key("properties") {
        return Value::Object(obj);
    }

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        match param_type {
            Value::String(type_str) => {
                properties.insert(param_name.clone(), type_to_json_schema(&type_str));
                required.push(param_name);
            }
            Value::Object(mut prop) => {
                let is_optional = prop
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let is_required = prop.remove("required").and_then(|v| v.as_bool());
                let has_default = prop.contains_key("default");

                properties.insert(param_name.clone(), Value::Object(prop));

                // explicit flags win, then a default makes the property optional
                match is_required {
                    Some(true) => required.push(param_name),
                    Some(false) => {}
                    None if is_optional || has_default => {}
                    None => required.push(param_name),
                }
            }
            _ => {}
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// Map a friendly type name to a JSON Schema type object. Unknown names
/// fall back to `string`.
fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    };

    serde_json::json!({ "type": json_type })
}

/// Fluent builder returned by [`tool()`].
///
/// Use either [`ToolBuilder::schema`] or [`ToolBuilder::param`]; calling
/// `param` after a non-object schema resets the schema to `{}` first.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    /// Replace the schema entirely.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add one required parameter in compact notation.
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        if let Value::Object(map) = &mut self.schema {
            map.insert(name.to_string(), Value::String(type_str.to_string()));
        }
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }
}

/// Start building a tool.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    #[test]
    fn test_type_to_json_schema() {
        assert_eq!(type_to_json_schema("string"), json!({"type": "string"}));
        assert_eq!(type_to_json_schema("i64"), json!({"type": "integer"}));
        assert_eq!(type_to_json_schema("f32"), json!({"type": "number"}));
        assert_eq!(type_to_json_schema("bool"), json!({"type": "boolean"}));
        assert_eq!(type_to_json_schema("whatever"), json!({"type": "string"}));
    }

    #[test]
    fn test_normalize_compact_schema() {
        let result = normalize_schema(json!({
            "location": "string",
            "units": {"type": "string", "optional": true},
            "limit": {"type": "integer", "default": 5}
        }));

        assert_eq!(result["type"], "object");
        assert_eq!(result["properties"]["location"]["type"], "string");
        assert!(result["properties"]["units"].get("optional").is_none());
        assert_eq!(result["required"], json!(["location"]));
    }

    #[test]
    fn test_full_schema_passes_through() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        assert_eq!(normalize_schema(schema.clone()), schema);
    }

    #[tokio::test]
    async fn test_tool_invoke() {
        let add = tool("add", "Add two numbers")
            .param("a", "number")
            .param("b", "number")
            .build(|args, _cancel| async move {
                let a = args
                    .get("a")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::invalid_input("Parameter 'a' must be a number"))?;
                let b = args
                    .get("b")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::invalid_input("Parameter 'b' must be a number"))?;
                Ok(json!(a + b))
            });

        let args = add.parse_arguments(r#"{"a": 5, "b": 3}"#).unwrap();
        let result = add.invoke(args, CancellationToken::new()).await.unwrap();
        assert_eq!(result, json!(8.0));
    }

    #[test]
    fn test_parse_arguments_rejects_schema_violation() {
        let lookup = tool("lookup", "Lookup")
            .param("id", "integer")
            .build(|_, _| async { Ok(json!(null)) });

        assert!(lookup.parse_arguments(r#"{"id": 7}"#).is_ok());
        assert!(lookup.parse_arguments(r#"{"id": "seven"}"#).is_err());
        assert!(lookup.parse_arguments(r#"{}"#).is_err());
    }

    #[test]
    fn test_to_api_tool() {
        let t = tool("search", "Search for information")
            .param("query", "string")
            .build(|_, _| async { Ok(json!({})) });

        let api = t.to_api_tool();
        assert_eq!(api.name, "search");
        assert_eq!(api.description, "Search for information");
        assert_eq!(api.parameters["properties"]["query"]["type"], "string");
    }

    #[test]
    fn test_param_after_non_object_schema() {
        let t = tool("test", "Test tool")
            .schema(json!("string"))
            .param("key", "number")
            .build(|_, _| async { Ok(json!({})) });

        assert!(t.schema()["properties"]["key"].is_object());
    }
}
