//! Vector store lookup tool

use super::{HttpToolEndpoint, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub struct VectorSearchTool {
    endpoint: HttpToolEndpoint,
}

impl VectorSearchTool {
    pub fn new(endpoint: HttpToolEndpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct VectorSearchInput {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

fn default_top_k() -> u32 {
    4
}

#[async_trait]
impl Tool for VectorSearchTool {
    fn name(&self) -> &'static str {
        "vector_search"
    }

    fn description(&self) -> String {
        "Look up passages from the indexed document store that are semantically close to the query.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {"type": "string", "description": "What to look up"},
                "top_k": {"type": "integer", "description": "Number of passages (default 4)"},
                "namespace": {"type": "string", "description": "Optional collection to search"}
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<Value, ToolError> {
        let input: VectorSearchInput = ToolError::parse_input(input)?;
        if input.top_k == 0 {
            return Err(ToolError::InvalidArguments("top_k must be at least 1".to_string()));
        }
        self.endpoint.post(&input).await
    }
}
