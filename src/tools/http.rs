//! Shared JSON-over-HTTP client for tool backends

use super::ToolError;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// A tool backend reached by POSTing JSON and reading JSON back
pub struct HttpToolEndpoint {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpToolEndpoint {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(TOOL_TIMEOUT)
            .build()
            .map_err(|e| ToolError::Execution(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    pub async fn post<B: Serialize + Sync>(&self, body: &B) -> Result<Value, ToolError> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Execution(format!("tool backend timed out: {e}"))
            } else {
                ToolError::Execution(format!("tool backend unreachable: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution(format!(
                "tool backend returned {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("tool backend sent invalid JSON: {e}")))
    }
}
