//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Wraps a rig completion model. An agent is built per request so each call
/// can carry its own preamble and token limit.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .joined(Role::User)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "request has no user message".to_string(),
            })?;

        let mut builder = AgentBuilder::new(self.model.clone());
        if let Some(preamble) = request.joined(Role::System) {
            builder = builder.preamble(&preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        let agent = builder.build();

        let content = agent
            .prompt(prompt.as_str())
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(model = %self.model_name, chars = content.len(), "LLM completion received");
        Ok(CompletionResponse { content })
    }
}
