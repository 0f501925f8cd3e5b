//! Web search tool

use super::{HttpToolEndpoint, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DEFAULT_MAX_RESULTS: u32 = 5;

pub struct WebSearchTool {
    endpoint: HttpToolEndpoint,
}

impl WebSearchTool {
    pub fn new(endpoint: HttpToolEndpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct WebSearchInput {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> String {
        "Search the web for current information. Returns a list of results with title, URL and snippet. Use for recent events or facts you are unsure about.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)"
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<Value, ToolError> {
        let input: WebSearchInput = ToolError::parse_input(input)?;
        if input.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query is empty".to_string()));
        }
        self.endpoint.post(&input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults() {
        let input: WebSearchInput = ToolError::parse_input(json!({"query": "rust"})).unwrap();
        assert_eq!(input.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({"query": "rust", "max_results": 5})
        );
    }

    #[tokio::test]
    async fn test_blank_query_is_invalid() {
        let tool = WebSearchTool::new(HttpToolEndpoint::new("http://127.0.0.1:9", None).unwrap());
        let ctx = ToolContext {
            turn_id: "t".to_string(),
            call_id: "c".to_string(),
        };
        let err = tool.run(json!({"query": "  "}), ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
