//! Tool invocation protocol
//!
//! Tools are external collaborators reached over HTTP. The registry owns the
//! call/result contract: lookup, argument validation against the declared
//! schema, execution, and mapping every failure into a tool-result error.

mod http;
mod image;
mod vector_search;
mod web_search;

pub use http::HttpToolEndpoint;
pub use image::GenerateImageTool;
pub use vector_search::VectorSearchTool;
pub use web_search::WebSearchTool;

use crate::config::ToolEndpoints;
use crate::llm::{ToolCallRequest, ToolDefinition};
use crate::message::{ToolErrorKind, ToolOutcome};
use async_trait::async_trait;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Per-call context handed to a tool
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub turn_id: String,
    pub call_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Execution(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
            ToolError::Execution(_) => ToolErrorKind::Execution,
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
        }
    }

    /// Parse typed input, reporting failures as invalid arguments
    pub fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, ToolError> {
        serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))
    }
}

impl From<ToolError> for ToolOutcome {
    fn from(e: ToolError) -> Self {
        ToolOutcome::error(e.kind(), e.to_string())
    }
}

/// A tool the model may call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute with arguments that already passed schema validation
    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, ToolError>;
}

/// How a step's tool calls are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolConcurrency {
    /// One at a time, in call order
    #[default]
    Serial,
    /// All at once; results are still reported in call order
    Parallel,
}

impl FromStr for ToolConcurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(ToolConcurrency::Serial),
            "parallel" => Ok(ToolConcurrency::Parallel),
            other => Err(format!("expected serial or parallel, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolPolicy {
    /// Maximum model steps per turn
    pub max_steps: u32,
    pub concurrency: ToolConcurrency,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            max_steps: 10,
            concurrency: ToolConcurrency::Serial,
        }
    }
}

/// Check `args` against the subset of JSON Schema tools declare: object
/// type, required fields and primitive property types.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) == Some("object") && !args.is_object() {
        return Err(format!("expected an object, got {}", json_type(args)));
    }
    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(field) {
                return Err(format!("missing required field `{field}`"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, value) in obj {
            let Some(declared) = properties.get(name).and_then(|p| p.get("type")) else {
                continue;
            };
            let allowed: Vec<&str> = match declared {
                Value::String(t) => vec![t.as_str()],
                Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
                _ => continue,
            };
            if !allowed.iter().any(|t| matches_type(t, value)) {
                return Err(format!(
                    "field `{name}` should be {}, got {}",
                    allowed.join(" or "),
                    json_type(value)
                ));
            }
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Executes tool calls on behalf of a turn
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one call; every failure is reported as an error outcome
    async fn execute(&self, call: &ToolCallRequest, ctx: ToolContext) -> ToolOutcome;
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }

    async fn execute(&self, call: &ToolCallRequest, ctx: ToolContext) -> ToolOutcome {
        (**self).execute(call, ctx).await
    }
}

/// Collection of tools offered to the model
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the HTTP-backed tools whose endpoints are configured
    pub fn from_config(endpoints: &ToolEndpoints) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        let key = endpoints.api_key.clone();
        if let Some(url) = &endpoints.web_search {
            registry = registry.with_tool(Arc::new(WebSearchTool::new(HttpToolEndpoint::new(
                url,
                key.clone(),
            )?)));
        }
        if let Some(url) = &endpoints.vector_search {
            registry = registry.with_tool(Arc::new(VectorSearchTool::new(
                HttpToolEndpoint::new(url, key.clone())?,
            )));
        }
        if let Some(url) = &endpoints.image {
            registry = registry.with_tool(Arc::new(GenerateImageTool::new(HttpToolEndpoint::new(
                url, key,
            )?)));
        }
        Ok(registry)
    }

    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Look up, validate and run a call.
    ///
    /// The tool runs in its own task so a panic surfaces as an execution
    /// error instead of tearing down the turn.
    pub async fn invoke(&self, call: &ToolCallRequest, ctx: ToolContext) -> ToolOutcome {
        let Some(tool) = self.find(&call.tool_name) else {
            tracing::warn!(tool = %call.tool_name, call_id = %call.call_id, "Unknown tool requested");
            return ToolError::UnknownTool(call.tool_name.clone()).into();
        };

        if let Err(reason) = validate_args(&tool.input_schema(), &call.args) {
            tracing::info!(tool = %call.tool_name, call_id = %call.call_id, %reason, "Rejected tool arguments");
            return ToolError::InvalidArguments(reason).into();
        }

        let start = Instant::now();
        let args = call.args.clone();
        let task_ctx = ctx.clone();
        let task = tokio::spawn(async move { tool.run(args, task_ctx).await });
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(ToolError::Execution(format!("tool task failed: {e}"))),
        };

        match result {
            Ok(output) => {
                tracing::info!(
                    tool = %call.tool_name,
                    turn_id = %ctx.turn_id,
                    call_id = %ctx.call_id,
                    duration_ms = %start.elapsed().as_millis(),
                    "Tool completed"
                );
                ToolOutcome::output(output)
            }
            Err(e) => {
                tracing::warn!(
                    tool = %call.tool_name,
                    turn_id = %ctx.turn_id,
                    call_id = %ctx.call_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e,
                    "Tool failed"
                );
                e.into()
            }
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    async fn execute(&self, call: &ToolCallRequest, ctx: ToolContext) -> ToolOutcome {
        self.invoke(call, ctx).await
    }
}
