//! Mock collaborators for turn tests
//!
//! These mocks let the runner be driven end to end without network I/O.

use crate::llm::{
    LanguageModel, LlmError, ModelChunk, ModelRequest, ModelStream, ToolCallRequest,
    ToolDefinition,
};
use crate::message::{ToolErrorKind, ToolOutcome};
use crate::moderation::{ModerationError, Moderator, Verdict};
use crate::tools::{ToolContext, ToolExecutor};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock Moderator
// ============================================================================

pub struct MockModerator {
    verdict: Result<Verdict, String>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockModerator {
    pub fn clear() -> Self {
        Self::with_result(Ok(Verdict::clear()))
    }

    pub fn flag(denial_message: Option<String>) -> Self {
        Self::with_result(Ok(Verdict::flagged(denial_message)))
    }

    pub fn failing() -> Self {
        Self::with_result(Err("moderation backend unavailable".to_string()))
    }

    fn with_result(verdict: Result<Verdict, String>) -> Self {
        Self {
            verdict,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Texts classified so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Moderator for MockModerator {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        self.calls.lock().unwrap().push(text.to_string());
        self.verdict.clone().map_err(ModerationError::Request)
    }
}

// ============================================================================
// Scripted Model
// ============================================================================

/// One scripted generation step
#[allow(dead_code)]
pub enum ScriptedStep {
    /// The request itself fails
    Reject(LlmError),
    /// Yield these items, then end
    Items(Vec<Result<ModelChunk, LlmError>>),
    /// Yield these chunks, then never end
    Hang(Vec<ModelChunk>),
}

impl ScriptedStep {
    pub fn chunks(chunks: Vec<ModelChunk>) -> Self {
        ScriptedStep::Items(chunks.into_iter().map(Ok).collect())
    }

    pub fn chunks_then_error(chunks: Vec<ModelChunk>, error: LlmError) -> Self {
        let mut items: Vec<_> = chunks.into_iter().map(Ok).collect();
        items.push(Err(error));
        ScriptedStep::Items(items)
    }
}

/// Model that plays back queued steps and records every request
pub struct ScriptedModel {
    steps: Mutex<VecDeque<ScriptedStep>>,
    requests: Mutex<Vec<ModelRequest>>,
}

#[allow(dead_code)]
impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_step(&self, step: ScriptedStep) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream_step(&self, request: &ModelRequest) -> Result<ModelStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ScriptedStep::Reject(e)) => Err(e),
            Some(ScriptedStep::Items(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(ScriptedStep::Hang(chunks)) => Ok(futures::stream::iter(chunks)
                .map(Ok)
                .chain(futures::stream::pending())
                .boxed()),
            None => Err(LlmError::network("No scripted step queued")),
        }
    }

    fn model_id(&self) -> &'static str {
        "scripted"
    }
}

// ============================================================================
// Mock Tools
// ============================================================================

/// Tool executor with fixed outputs per tool name
pub struct MockTools {
    outputs: Mutex<HashMap<String, Value>>,
    /// Delays keyed by the call's `query` argument
    delays: Mutex<HashMap<String, Duration>>,
    executions: Mutex<Vec<ToolCallRequest>>,
}

#[allow(dead_code)]
impl MockTools {
    pub fn new() -> Self {
        Self {
            outputs: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            executions: Mutex::new(Vec::new()),
        }
    }

    pub fn set_output(&self, tool_name: &str, output: Value) {
        self.outputs
            .lock()
            .unwrap()
            .insert(tool_name.to_string(), output);
    }

    /// Delay calls whose `query` argument equals `query`
    pub fn set_delay(&self, query: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(query.to_string(), delay);
    }

    pub fn executions(&self) -> Vec<ToolCallRequest> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.outputs
            .lock()
            .unwrap()
            .keys()
            .map(|name| ToolDefinition {
                name: name.clone(),
                description: format!("Mock {name}"),
                input_schema: json!({"type": "object", "properties": {}}),
            })
            .collect()
    }

    async fn execute(&self, call: &ToolCallRequest, _ctx: ToolContext) -> ToolOutcome {
        self.executions.lock().unwrap().push(call.clone());
        let delay = call.args["query"]
            .as_str()
            .and_then(|q| self.delays.lock().unwrap().get(q).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let output = self.outputs.lock().unwrap().get(&call.tool_name).cloned();
        match output {
            Some(output) => ToolOutcome::output(output),
            None => ToolOutcome::error(
                ToolErrorKind::UnknownTool,
                format!("unknown tool: {}", call.tool_name),
            ),
        }
    }
}
