//! Image generation tool

use super::{HttpToolEndpoint, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const SIZES: &[&str] = &["256x256", "512x512", "1024x1024"];

pub struct GenerateImageTool {
    endpoint: HttpToolEndpoint,
}

impl GenerateImageTool {
    pub fn new(endpoint: HttpToolEndpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct GenerateImageInput {
    prompt: String,
    #[serde(default = "default_size")]
    size: String,
}

fn default_size() -> String {
    "1024x1024".to_string()
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &'static str {
        "generate_image"
    }

    fn description(&self) -> String {
        "Generate an image from a text prompt. Returns a URL to the generated image.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["prompt"],
            "properties": {
                "prompt": {"type": "string", "description": "Description of the image"},
                "size": {"type": "string", "enum": SIZES, "description": "Image size (default 1024x1024)"}
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<Value, ToolError> {
        let input: GenerateImageInput = ToolError::parse_input(input)?;
        if !SIZES.contains(&input.size.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "unsupported size {}",
                input.size
            )));
        }
        self.endpoint.post(&input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_unknown_size() {
        let tool =
            GenerateImageTool::new(HttpToolEndpoint::new("http://127.0.0.1:9", None).unwrap());
        let ctx = ToolContext {
            turn_id: "t".to_string(),
            call_id: "c".to_string(),
        };
        let err = tool
            .run(json!({"prompt": "a cat", "size": "3x3"}), ctx)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::InvalidArguments("unsupported size 3x3".to_string()));
    }
}
