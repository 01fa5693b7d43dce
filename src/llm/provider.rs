use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use super::{Message, ToolCall};
use crate::config::ProviderDescriptor;
use crate::error::AgentError;

/// Token accounting reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model produced a final answer without requesting tools
    Stop,
    /// The model requested tools on the last allowed step
    MaxSteps,
}

/// Tool definition as presented to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One model round-trip
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Response from an LLM
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The message content
    pub message: Message,
    /// Tool calls requested by the LLM
    pub tool_calls: Vec<ToolCall>,
    /// Token usage, when the provider reports it
    pub usage: Option<Usage>,
}

impl LlmResponse {
    /// A plain text answer with no tool calls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(content),
            tool_calls: Vec::new(),
            usage: None,
        }
    }

    /// An answer requesting tool calls
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            message: Message::assistant(content),
            tool_calls,
            usage: None,
        }
    }
}

/// Incremental output of a streamed round-trip
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A fragment of assistant text
    Text(String),
    /// A fully assembled tool call
    ToolCall(ToolCall),
    /// End of the response
    Done { usage: Option<Usage> },
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and get a response
    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse>;

    /// Send messages to the LLM and receive the response incrementally.
    ///
    /// Default implementation falls back to non-streaming `chat()` and yields
    /// the complete text as a single chunk.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let response = self.chat(request).await?;
        let mut chunks = Vec::with_capacity(response.tool_calls.len() + 2);
        if !response.message.content.is_empty() {
            chunks.push(Ok(StreamChunk::Text(response.message.content)));
        }
        chunks.extend(response.tool_calls.into_iter().map(|c| Ok(StreamChunk::ToolCall(c))));
        chunks.push(Ok(StreamChunk::Done {
            usage: response.usage,
        }));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Builds a provider client for a descriptor.
///
/// The credential travels inside the descriptor, so concurrent clients for
/// different providers never share state.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, descriptor: &ProviderDescriptor) -> Result<Arc<dyn LlmProvider>, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_add_sums_and_saturates() {
        let mut total = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: u32::MAX - 1,
        };
        total.add(&Usage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 15,
        });

        assert_eq!(total.prompt_tokens, 13);
        assert_eq!(total.completion_tokens, 7);
        assert_eq!(total.total_tokens, u32::MAX);
    }
}
