use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

/// Named arguments passed to a tool: always a JSON object.
pub type ToolArgs = serde_json::Map<String, Value>;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors raised by [`ToolRegistry`] mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("tool '{name}' not found in registry")]
    NotFound { name: String },
}

/// Argument validation failures reported by [`ToolSpec::validate_args`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("missing required parameter: {name}")]
    MissingParam { name: String },

    #[error("parameter '{name}' must be of type {expected}, got {actual}")]
    InvalidType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

// ── Tool schema ──────────────────────────────────────────────────────────────

/// JSON-friendly type hint for a tool parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Describes a single parameter that a tool accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub required: bool,
    #[serde(default)]
    pub param_type: ParamType,
    /// Allowed values when the parameter is an enum.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParam {
    /// Required string parameter.
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            ..Default::default()
        }
    }

    /// Optional string parameter.
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
            ..Default::default()
        }
    }

    pub fn with_type(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }
}

/// Static description of a tool, sent to the model so it can decide which
/// tool to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolSpec {
    /// The `parameters` object of the function schema.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required: Vec<String> = Vec::new();

        for p in &self.params {
            let mut prop = serde_json::json!({
                "type": p.param_type.as_str(),
                "description": p.description,
            });
            if !p.enum_values.is_empty() {
                prop["enum"] = serde_json::json!(p.enum_values);
            }
            if let Some(ref def) = p.default {
                prop["default"] = def.clone();
            }
            properties.insert(p.name.clone(), prop);
            if p.required {
                required.push(p.name.clone());
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// The `tools` array element accepted by Ollama `/api/chat` and
    /// OpenAI-compatible endpoints.
    ///
    /// ```json
    /// { "type": "function",
    ///   "function": { "name": "echo", "description": "...", "parameters": { ... } } }
    /// ```
    pub fn to_openai_tool_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema(),
            }
        })
    }

    /// Check required parameters and declared JSON types.  Parameters the
    /// schema does not know about are logged and otherwise ignored.
    pub fn validate_args(&self, args: &ToolArgs) -> Result<(), ToolError> {
        for p in self.params.iter().filter(|p| p.required) {
            if !args.contains_key(&p.name) {
                return Err(ToolError::MissingParam {
                    name: p.name.clone(),
                });
            }
        }

        for (key, value) in args {
            let Some(param) = self.params.iter().find(|p| &p.name == key) else {
                warn!(tool = %self.name, param = %key, "unknown parameter");
                continue;
            };
            if !param.param_type.accepts(value) {
                return Err(ToolError::InvalidType {
                    name: key.clone(),
                    expected: param.param_type.as_str(),
                    actual: json_type_name(value),
                });
            }
        }
        Ok(())
    }
}

// ── Tool trait ───────────────────────────────────────────────────────────────

/// Trait implemented by every tool.  The core treats all tools alike; what a
/// tool actually does (file I/O, OS calls, input automation) is opaque.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn run(&self, args: &ToolArgs) -> Result<Value>;
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Name → tool mapping.  Built once at startup and then shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.  Fails without touching the registry when the name is
    /// already taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.spec().name;
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateName { name });
        }
        info!(tool = %name, "registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<Box<dyn Tool>, RegistryError> {
        let tool = self.tools.remove(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })?;
        info!(tool = %name, "unregistered tool");
        Ok(tool)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list(&self) -> Vec<&dyn Tool> {
        self.tools.values().map(|t| t.as_ref()).collect()
    }

    /// Specs sorted by name so schema export is stable between calls.
    pub fn list_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// The `tools` JSON array sent to the model backend.
    pub fn schema_export(&self) -> Value {
        specs_to_openai_tools(&self.list_specs())
    }
}

/// Convert a slice of `ToolSpec` into the `tools` JSON array.
pub fn specs_to_openai_tools(specs: &[ToolSpec]) -> Value {
    Value::Array(specs.iter().map(|s| s.to_openai_tool_schema()).collect())
}

// ── Built-in tools ───────────────────────────────────────────────────────────

pub mod builtins;
pub use builtins::{EchoTool, GetSystemInfoTool, GetTimeTool, default_registry};

// ── ToolRegistry tests ───────────────────────────────────────────────────────
