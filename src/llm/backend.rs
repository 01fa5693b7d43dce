use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{
    ChatMessage, ChatRole, FunctionTool, MessageType, StreamChunk as LlmChunk, Tool as LlmTool,
};
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    ChatRequest, ChunkStream, LlmProvider, LlmResponse, Message, MessageRole, ProviderFactory,
    StreamChunk, ToolCall, ToolDefinition,
};
use crate::config::{ProviderDescriptor, ProviderKind};
use crate::error::AgentError;

const DEFAULT_MAX_TOKENS: u32 = 8192;
const API_TIMEOUT_SECS: u64 = 120;

/// Provider client backed by the `llm` crate.
///
/// One type serves every supported provider; the backend is chosen from the
/// descriptor and the credential is handed straight to the client builder.
pub struct LlmCrateProvider {
    kind: ProviderKind,
    model: String,
    api_key: String,
}

impl LlmCrateProvider {
    pub fn new(descriptor: &ProviderDescriptor) -> Result<Self, AgentError> {
        descriptor.validate()?;
        Ok(Self {
            kind: descriptor.kind,
            model: descriptor.model.clone(),
            api_key: descriptor.api_key.clone(),
        })
    }

    fn backend(&self) -> LLMBackend {
        match self.kind {
            ProviderKind::OpenAI => LLMBackend::OpenAI,
            ProviderKind::Anthropic => LLMBackend::Anthropic,
            ProviderKind::Google => LLMBackend::Google,
            ProviderKind::OpenRouter => LLMBackend::OpenRouter,
        }
    }

    /// Build the llm crate client for one request.
    fn build_client(
        &self,
        request: &ChatRequest,
        llm_tools: &[LlmTool],
    ) -> Result<Box<dyn llm::LLMProvider>> {
        // The llm crate takes tools at build time, so the client is rebuilt per call.
        let mut builder = LLMBuilder::new()
            .backend(self.backend())
            .api_key(&self.api_key)
            .model(&self.model)
            .max_tokens(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS));

        if let Some(system) = &request.system {
            builder = builder.system(system);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        for tool in llm_tools {
            builder = builder.function(
                llm::builder::FunctionBuilder::new(&tool.function.name)
                    .description(&tool.function.description)
                    .json_schema(tool.function.parameters.clone()),
            );
        }

        builder.build().context("failed to build LLM client")
    }
}

#[async_trait]
impl LlmProvider for LlmCrateProvider {
    fn name(&self) -> &str {
        match self.kind {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let provider_name = self.kind.display_name();
        let llm_tools = build_llm_tools(&request.tools);
        let llm = self.build_client(request, &llm_tools)?;
        let chat_messages: Vec<ChatMessage> =
            request.messages.iter().filter_map(convert_message).collect();

        let api_timeout = Duration::from_secs(API_TIMEOUT_SECS);
        let timeout_msg = format!(
            "{} API call timed out after {} seconds",
            provider_name, API_TIMEOUT_SECS
        );
        let error_msg = format!("failed to call {} API", provider_name);

        let response: Box<dyn llm::chat::ChatResponse> = if llm_tools.is_empty() {
            timeout(api_timeout, llm.chat(&chat_messages))
                .await
                .context(timeout_msg)?
                .context(error_msg)?
        } else {
            timeout(
                api_timeout,
                llm.chat_with_tools(&chat_messages, Some(llm_tools.as_slice())),
            )
            .await
            .context(timeout_msg)?
            .context(error_msg)?
        };

        let tool_calls: Vec<ToolCall> = response
            .tool_calls()
            .map(|calls| calls.into_iter().map(convert_tool_call).collect())
            .unwrap_or_default();

        let content = response.text().unwrap_or_else(|| {
            // Empty content is normal for tool-use responses
            if tool_calls.is_empty() {
                warn!("{} API returned empty response text", provider_name);
            }
            String::new()
        });

        debug!(
            provider = provider_name,
            tool_calls = tool_calls.len(),
            "received model response"
        );

        Ok(LlmResponse {
            message: Message::assistant(content),
            tool_calls,
            usage: None,
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let provider_name = self.kind.display_name();
        let llm_tools = build_llm_tools(&request.tools);
        let llm = self.build_client(request, &llm_tools)?;
        let chat_messages: Vec<ChatMessage> =
            request.messages.iter().filter_map(convert_message).collect();

        let tools = if llm_tools.is_empty() {
            None
        } else {
            Some(llm_tools.as_slice())
        };

        let stream = timeout(
            Duration::from_secs(API_TIMEOUT_SECS),
            llm.chat_stream_with_tools(&chat_messages, tools),
        )
        .await
        .with_context(|| {
            format!(
                "{} streaming API call timed out after {} seconds",
                provider_name, API_TIMEOUT_SECS
            )
        })?
        .with_context(|| format!("failed to start {} streaming", provider_name))?;

        let chunks = stream.filter_map(|chunk| async move {
            match chunk {
                Ok(LlmChunk::Text(text)) => Some(Ok(StreamChunk::Text(text))),
                Ok(LlmChunk::ToolUseComplete { tool_call, .. }) => {
                    Some(Ok(StreamChunk::ToolCall(convert_tool_call(tool_call))))
                }
                Ok(LlmChunk::Done { .. }) => Some(Ok(StreamChunk::Done { usage: None })),
                // ToolUseStart, ToolUseInputDelta: intermediate events
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "stream chunk error");
                    Some(Err(anyhow::anyhow!("streaming error: {}", e)))
                }
            }
        });

        Ok(Box::pin(chunks))
    }
}

/// Default factory producing [`LlmCrateProvider`] clients
#[derive(Debug, Default, Clone, Copy)]
pub struct LlmCrateFactory;

impl ProviderFactory for LlmCrateFactory {
    fn create(&self, descriptor: &ProviderDescriptor) -> Result<Arc<dyn LlmProvider>, AgentError> {
        Ok(Arc::new(LlmCrateProvider::new(descriptor)?))
    }
}

/// Build llm crate tool definitions from ours.
fn build_llm_tools(tools: &[ToolDefinition]) -> Vec<LlmTool> {
    tools
        .iter()
        .map(|t| LlmTool {
            tool_type: "function".to_string(),
            function: FunctionTool {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
            cache_control: None,
        })
        .collect()
}

fn convert_tool_call(tc: llm::ToolCall) -> ToolCall {
    let arguments = match serde_json::from_str(&tc.function.arguments) {
        Ok(args) => args,
        Err(e) => {
            warn!(
                tool = %tc.function.name,
                error = %e,
                "failed to parse tool call arguments as JSON"
            );
            serde_json::json!({
                "error": format!("Failed to parse arguments: {}", e)
            })
        }
    };
    let id = if tc.id.is_empty() {
        format!("call_{}", Uuid::new_v4().simple())
    } else {
        tc.id
    };
    ToolCall {
        id,
        name: tc.function.name,
        arguments,
    }
}

/// Convert our Message to the llm crate's ChatMessage format
fn convert_message(msg: &Message) -> Option<ChatMessage> {
    match msg.role {
        MessageRole::User => Some(ChatMessage {
            role: ChatRole::User,
            message_type: MessageType::Text,
            content: msg.content.clone(),
        }),
        MessageRole::Assistant => {
            if msg.tool_calls.is_empty() {
                Some(ChatMessage {
                    role: ChatRole::Assistant,
                    message_type: MessageType::Text,
                    content: msg.content.clone(),
                })
            } else {
                let tool_calls: Vec<llm::ToolCall> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| llm::ToolCall {
                        id: tc.id.clone(),
                        call_type: "function".to_string(),
                        function: llm::FunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.to_string(),
                        },
                    })
                    .collect();
                Some(ChatMessage {
                    role: ChatRole::Assistant,
                    message_type: MessageType::ToolUse(tool_calls),
                    content: msg.content.clone(),
                })
            }
        }
        MessageRole::Tool => msg.tool_result.as_ref().map(|result| {
            let tool_call = llm::ToolCall {
                id: result.tool_call_id.clone(),
                call_type: "function".to_string(),
                function: llm::FunctionCall {
                    name: result.tool_name.clone(),
                    arguments: result.result.clone(),
                },
            };
            ChatMessage {
                role: ChatRole::User,
                message_type: MessageType::ToolResult(vec![tool_call]),
                content: String::new(),
            }
        }),
        // The system prompt goes through the client builder
        MessageRole::System => None,
    }
}
