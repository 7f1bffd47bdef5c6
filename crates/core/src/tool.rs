//! Tool trait and registry.
//!
//! The registry's string-level contract never fails: unknown tools, invalid
//! parameters, tool errors and even panics inside a tool come back as error
//! text, which the orchestration loop feeds to the model like any other
//! tool output.

use crate::error::ToolError;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// `false` when the tool handled bad input itself (the output then
    /// carries the explanation)
    pub success: bool,

    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Catalog entry advertised to the model and to API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,

    /// JSON Schema of the parameters object
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name the model uses in a directive (e.g., "calculator").
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with an already-validated parameters object.
    async fn execute(&self, arguments: Value) -> std::result::Result<ToolResult, ToolError>;

    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Name-keyed set of tools, enumerated in registration order.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn with_tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tool metadata in registration order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.to_descriptor())
            .collect()
    }

    /// Run `name` with `parameters` and render the outcome as text.
    pub async fn execute(&self, name: &str, parameters: Value) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "Unknown tool requested");
            return format!("Error: Unknown action '{name}'");
        };

        let outcome = match validate_arguments(&tool.parameters_schema(), parameters) {
            Ok(arguments) => AssertUnwindSafe(tool.execute(arguments))
                .catch_unwind()
                .await
                .unwrap_or(Err(ToolError::Panicked)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                debug!(tool = name, success = result.success, bytes = result.output.len(), "Tool finished");
                result.output
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool failed");
                format!("Error executing {name}: {e}")
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `null` becomes `{}`; anything else must be an object carrying every key
/// listed in the schema's `required` array.
fn validate_arguments(schema: &Value, arguments: Value) -> std::result::Result<Value, ToolError> {
    let arguments = match arguments {
        Value::Null => Value::Object(serde_json::Map::new()),
        Value::Object(map) => Value::Object(map),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "parameters must be a JSON object, got {}",
                json_kind(&other)
            )));
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if arguments.get(key).is_none_or(Value::is_null) {
                return Err(ToolError::InvalidArguments(format!("missing required parameter '{key}'")));
            }
        }
    }

    Ok(arguments)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
