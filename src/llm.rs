//! Model backend abstraction
//!
//! A generation step is an ordered stream of [`ModelChunk`]s; the backend
//! itself is an external collaborator behind [`LanguageModel`].

mod error;
mod openai;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAiChatModel;
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Chunks of one generation step
pub type ModelStream = BoxStream<'static, Result<ModelChunk, LlmError>>;

/// Common interface for model backends
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start one generation step; chunks arrive as the backend produces them
    async fn stream_step(&self, request: &ModelRequest) -> Result<ModelStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    async fn stream_step(&self, request: &ModelRequest) -> Result<ModelStream, LlmError> {
        (**self).stream_step(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for model backends
pub struct LoggingModel {
    inner: Arc<dyn LanguageModel>,
    model_id: String,
}

impl LoggingModel {
    pub fn new(inner: Arc<dyn LanguageModel>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LanguageModel for LoggingModel {
    async fn stream_step(&self, request: &ModelRequest) -> Result<ModelStream, LlmError> {
        let start = Instant::now();
        let result = self.inner.stream_step(request).await;

        match result {
            Ok(stream) => {
                tracing::info!(
                    model = %self.model_id,
                    messages = request.messages.len(),
                    tools = request.tools.len(),
                    first_byte_ms = %start.elapsed().as_millis(),
                    "Model step started"
                );
                let model_id = self.model_id.clone();
                Ok(stream
                    .inspect(move |chunk| {
                        if let Err(e) = chunk {
                            tracing::error!(
                                model = %model_id,
                                duration_ms = %start.elapsed().as_millis(),
                                error = %e.message,
                                "Model stream failed"
                            );
                        }
                    })
                    .boxed())
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Model request failed"
                );
                Err(e)
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
