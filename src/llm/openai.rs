//! `OpenAI`-compatible chat completions backend (streaming)

use super::types::*;
use super::{LanguageModel, LlmError, LlmErrorKind, ModelStream};
use crate::message::{Message, Part, Role, ToolCallState, ToolOutcome};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Chunks decoded ahead of the consumer before the reader waits
const CHUNK_BUFFER: usize = 32;

/// `OpenAI`-compatible streaming chat service
pub struct OpenAiChatModel {
    client: Client,
    api_key: Option<String>,
    url: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(
        api_key: Option<String>,
        base_url: &str,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }

    fn translate_request(&self, request: &ModelRequest) -> OpenAIRequest {
        let mut messages = Vec::new();

        if let Some(system) = &request.system {
            messages.push(OpenAIMessage::plain("system", system.clone()));
        }

        for msg in &request.messages {
            messages.extend(Self::translate_message(msg));
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        r#type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            tools,
            stream: true,
        }
    }

    /// Translate a message to `OpenAI` format.
    ///
    /// Returns a Vec because tool results become separate "tool" messages,
    /// each placed right after the assistant message carrying its call.
    fn translate_message(msg: &Message) -> Vec<OpenAIMessage> {
        match msg.role {
            Role::User => vec![OpenAIMessage::plain("user", msg.text())],
            Role::System => vec![OpenAIMessage::plain("system", msg.text())],
            Role::Assistant => Self::translate_assistant(msg),
        }
    }

    fn translate_assistant(msg: &Message) -> Vec<OpenAIMessage> {
        // Calls without a result (cancelled turns) cannot be replayed
        let answered: HashSet<&str> = msg
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();

        let mut messages = Vec::new();
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in &msg.parts {
            match part {
                Part::Text { text: t, .. } => text.push_str(t),
                Part::ToolCall {
                    call_id,
                    tool_name,
                    args,
                    state: ToolCallState::InputAvailable,
                } if answered.contains(call_id.as_str()) => {
                    tool_calls.push(OpenAIToolCall {
                        id: call_id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: tool_name.clone(),
                            arguments: serde_json::to_string(args)
                                .unwrap_or_else(|_| "{}".to_string()),
                        },
                    });
                }
                Part::ToolResult {
                    call_id, outcome, ..
                } => {
                    flush_assistant(&mut messages, &mut text, &mut tool_calls);
                    let content = match outcome {
                        ToolOutcome::Output { output } => {
                            serde_json::to_string(output).unwrap_or_else(|_| "null".to_string())
                        }
                        ToolOutcome::Error { error, .. } => format!("Error: {error}"),
                    };
                    messages.push(OpenAIMessage {
                        role: "tool".to_string(),
                        content: Some(content),
                        tool_calls: None,
                        tool_call_id: Some(call_id.clone()),
                    });
                }
                Part::ToolCall { .. } | Part::Reasoning { .. } => {}
            }
        }
        flush_assistant(&mut messages, &mut text, &mut tool_calls);
        messages
    }
}

fn flush_assistant(
    messages: &mut Vec<OpenAIMessage>,
    text: &mut String,
    tool_calls: &mut Vec<OpenAIToolCall>,
) {
    if text.is_empty() && tool_calls.is_empty() {
        return;
    }
    let content = std::mem::take(text);
    let calls = std::mem::take(tool_calls);
    messages.push(OpenAIMessage {
        role: "assistant".to_string(),
        content: (!content.is_empty()).then_some(content),
        tool_calls: (!calls.is_empty()).then_some(calls),
        tool_call_id: None,
    });
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn stream_step(&self, request: &ModelRequest) -> Result<ModelStream, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::new(LlmErrorKind::Auth, "No API key configured"))?;

        let body = self.translate_request(request);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |r| r.error.message);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        tokio::spawn(pump_chunks(response.bytes_stream().boxed(), tx));
        Ok(ReceiverStream::new(rx).boxed())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Read the SSE body line by line and forward decoded chunks.
///
/// Returns as soon as the receiver is dropped, which drops the response body
/// and aborts the request.
async fn pump_chunks<B: AsRef<[u8]>>(
    mut body: BoxStream<'static, reqwest::Result<B>>,
    tx: mpsc::Sender<Result<ModelChunk, LlmError>>,
) {
    let mut decoder = ChunkDecoder::default();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(next) = body.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(Err(LlmError::stream(format!("Response body interrupted: {e}"))))
                    .await;
                return;
            }
        };
        buffer.extend_from_slice(bytes.as_ref());

        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            for item in decoder.decode_line(line.trim_end()) {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
            if decoder.done {
                return;
            }
        }
    }

    if !decoder.finished {
        let _ = tx
            .send(Err(LlmError::stream("Stream ended without a finish reason")))
            .await;
        return;
    }
    for chunk in decoder.flush_tools() {
        if tx.send(Ok(chunk)).await.is_err() {
            return;
        }
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
    announced: bool,
}

/// Incremental decoder for `data:` lines of a chat completions stream
#[derive(Debug, Default)]
struct ChunkDecoder {
    tools: BTreeMap<u32, PendingToolCall>,
    /// Saw a `finish_reason`
    finished: bool,
    /// Saw `[DONE]`
    done: bool,
}

impl ChunkDecoder {
    fn decode_line(&mut self, line: &str) -> Vec<Result<ModelChunk, LlmError>> {
        let Some(data) = line.strip_prefix("data:") else {
            return Vec::new();
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            self.finished = true;
            return self.flush_tools().into_iter().map(Ok).collect();
        }

        let chunk: OpenAIStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                return vec![Err(LlmError::stream(format!("Malformed stream chunk: {e}")))];
            }
        };
        if let Some(error) = chunk.error {
            return vec![Err(LlmError::unknown(error.message))];
        }

        let mut out = Vec::new();
        for choice in chunk.choices {
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning) {
                if !reasoning.is_empty() {
                    out.push(Ok(ModelChunk::ReasoningDelta(reasoning)));
                }
            }
            if let Some(content) = delta.content {
                if !content.is_empty() {
                    out.push(Ok(ModelChunk::TextDelta(content)));
                }
            }
            for tc in delta.tool_calls.unwrap_or_default() {
                let pending = self.tools.entry(tc.index).or_default();
                if let Some(id) = tc.id {
                    pending.id = id;
                }
                let mut arguments = None;
                if let Some(function) = tc.function {
                    if let Some(name) = function.name {
                        pending.name.push_str(&name);
                    }
                    arguments = function.arguments;
                }
                if !pending.announced && !pending.id.is_empty() && !pending.name.is_empty() {
                    pending.announced = true;
                    out.push(Ok(ModelChunk::ToolInputStart {
                        call_id: pending.id.clone(),
                        tool_name: pending.name.clone(),
                    }));
                }
                if let Some(arguments) = arguments {
                    pending.arguments.push_str(&arguments);
                    if pending.announced && !arguments.is_empty() {
                        out.push(Ok(ModelChunk::ToolInputDelta {
                            call_id: pending.id.clone(),
                            delta: arguments,
                        }));
                    }
                }
            }
            if choice.finish_reason.is_some() {
                self.finished = true;
                out.extend(self.flush_tools().into_iter().map(Ok));
            }
        }
        out
    }

    /// Complete every accumulated tool call.
    ///
    /// Arguments that are not valid JSON are passed through as a string so
    /// that schema validation reports them as invalid arguments.
    fn flush_tools(&mut self) -> Vec<ModelChunk> {
        std::mem::take(&mut self.tools)
            .into_values()
            .filter(|pending| !pending.name.is_empty())
            .map(|pending| {
                let call_id = if pending.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    pending.id
                };
                let args = if pending.arguments.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&pending.arguments)
                        .unwrap_or(Value::String(pending.arguments))
                };
                ModelChunk::ToolCall(ToolCallRequest {
                    call_id,
                    tool_name: pending.name,
                    args,
                })
            })
            .collect()
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn plain(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
    /// Reasoning text, named differently by different providers
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
