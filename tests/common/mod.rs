#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use superdesign::llm::{ChatRequest, ChunkStream, StreamChunk};
use superdesign::{
    AgentBuilder, AgentError, BufferSink, CodingAgent, LlmConfig, LlmProvider, LlmResponse,
    ProviderDescriptor, ProviderFactory, ProviderKind, ToolCall, ToolRegistry,
};

/// A mock LLM provider that replays scripted responses in order
/// and records every request it receives.
pub struct MockLlmProvider {
    responses: Mutex<VecDeque<Result<LlmResponse>>>,
    requests: Mutex<Vec<ChatRequest>>,
    cancel_on_chat: Mutex<Option<CancellationToken>>,
}

impl MockLlmProvider {
    /// Create a mock that returns a single text response with no tool calls.
    pub fn single_response(text: &str) -> Arc<Self> {
        Self::with_responses(vec![LlmResponse::text(text)])
    }

    /// Create a mock from a sequence of responses (popped in order).
    pub fn with_responses(responses: Vec<LlmResponse>) -> Arc<Self> {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock whose first call fails with `message`.
    pub fn failing(message: &str) -> Arc<Self> {
        Self::scripted(vec![Err(anyhow::anyhow!(message.to_string()))])
    }

    pub fn scripted(responses: Vec<Result<LlmResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from(responses)),
            requests: Mutex::new(Vec::new()),
            cancel_on_chat: Mutex::new(None),
        })
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn push(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Cancel `token` from inside every `chat` call, before the response returns
    pub fn cancel_on_chat(&self, token: CancellationToken) {
        *self.cancel_on_chat.lock().unwrap() = Some(token);
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(token) = self.cancel_on_chat.lock().unwrap().as_ref() {
            token.cancel();
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("MockLlmProvider: no more responses in queue")))
    }

    /// Streams the scripted text word by word
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let response = self.chat(request).await?;
        let mut chunks: Vec<Result<StreamChunk>> = response
            .message
            .content
            .split_inclusive(' ')
            .map(|word| Ok(StreamChunk::Text(word.to_string())))
            .collect();
        chunks.extend(
            response
                .tool_calls
                .into_iter()
                .map(|c| Ok(StreamChunk::ToolCall(c))),
        );
        chunks.push(Ok(StreamChunk::Done {
            usage: response.usage,
        }));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Factory handing out the same mock for every descriptor
pub struct MockFactory(pub Arc<MockLlmProvider>);

impl ProviderFactory for MockFactory {
    fn create(&self, descriptor: &ProviderDescriptor) -> Result<Arc<dyn LlmProvider>, AgentError> {
        descriptor.validate()?;
        Ok(self.0.clone())
    }
}

pub fn test_config() -> LlmConfig {
    LlmConfig::new(ProviderDescriptor::new(
        ProviderKind::Anthropic,
        "claude-sonnet-4-20250514",
        "test-key",
    ))
}

/// Build a coding agent over `mock` with the default tools rooted at `dir`.
pub fn build_agent(dir: &Path, mock: Arc<MockLlmProvider>) -> (CodingAgent, BufferSink) {
    build_agent_with_tools(dir, mock, ToolRegistry::with_default_tools())
}

pub fn build_agent_with_tools(
    dir: &Path,
    mock: Arc<MockLlmProvider>,
    tools: ToolRegistry,
) -> (CodingAgent, BufferSink) {
    let sink = BufferSink::new();
    let agent = AgentBuilder::new()
        .llm_config(test_config())
        .factory(Arc::new(MockFactory(mock)))
        .tools(tools)
        .output(Arc::new(sink.clone()))
        .working_dir(dir)
        .build()
        .expect("agent builds with test config");
    (agent, sink)
}

pub fn write_call(id: &str, path: &str, content: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "write_file".to_string(),
        arguments: json!({"path": path, "content": content}),
    }
}

pub fn read_call(id: &str, path: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "read_file".to_string(),
        arguments: json!({"path": path}),
    }
}
