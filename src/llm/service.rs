use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::LlmCrateFactory;
use super::{
    ChatRequest, ChunkStream, FinishReason, LlmProvider, LlmResponse, Message, ProviderFactory,
    StreamChunk, ToolCall, ToolResult, Usage,
};
use crate::config::{DEFAULT_MAX_STEPS, LlmConfig, LlmConfigUpdate};
use crate::error::AgentError;
use crate::output::{SharedSink, TracingSink};
use crate::tools::ToolSet;

/// Per-request generation options
#[derive(Clone, Default)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Upper bound on model round-trips (default 25)
    pub max_steps: Option<usize>,
    pub tools: Option<ToolSet>,
    pub cancel: Option<CancellationToken>,
}

/// One model round-trip and the tools it resolved
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub index: usize,
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub usage: Option<Usage>,
}

/// Materialized result of a (possibly multi-step) generation
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    /// Text of the last step
    pub content: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    /// Every tool call across all steps, in order
    pub tool_calls: Vec<ToolCall>,
    /// Every tool result across all steps, in order
    pub tool_results: Vec<ToolResult>,
    pub steps: Vec<Step>,
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// Usage of a streamed generation; filled once the stream is fully drained
#[derive(Debug, Clone, Default)]
pub struct UsageHandle {
    inner: Arc<Mutex<(bool, Option<Usage>)>>,
}

impl UsageHandle {
    fn finish(&self, usage: Option<Usage>) {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = (true, usage);
    }

    /// Whether the stream has been drained to its end
    pub fn is_complete(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    /// Summed usage; `None` until the stream completes or when not reported
    pub fn get(&self) -> Option<Usage> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).1
    }
}

/// Lazy, single-pass text stream plus its deferred usage
pub struct StreamingResponse {
    pub stream: TextStream,
    pub usage: UsageHandle,
}

/// Provider-agnostic generation service.
///
/// Runs the tool loop explicitly: ask the model, execute requested tools,
/// feed results back, repeat until no tools are requested or the step budget
/// is spent.
pub struct LlmService {
    config: RwLock<LlmConfig>,
    factory: Arc<dyn ProviderFactory>,
    output: SharedSink,
}

impl LlmService {
    /// Create a service backed by the `llm` crate. Fails on invalid config.
    pub fn new(config: LlmConfig) -> Result<Self, AgentError> {
        Self::with_factory(config, Arc::new(LlmCrateFactory))
    }

    /// Create a service with a custom provider factory
    pub fn with_factory(
        config: LlmConfig,
        factory: Arc<dyn ProviderFactory>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        info!(provider = %config.provider.kind, model = %config.provider.model, "LLM service configured");
        Ok(Self {
            config: RwLock::new(config),
            factory,
            output: Arc::new(TracingSink),
        })
    }

    pub fn with_output(mut self, output: SharedSink) -> Self {
        self.output = output;
        self.output.append_line(&format!(
            "LLM service using {} ({})",
            self.config().provider.kind,
            self.config().provider.model
        ));
        self
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> LlmConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge a partial update and re-validate; the old config stays on failure
    pub fn update_config(&self, update: LlmConfigUpdate) -> Result<(), AgentError> {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let next = config.merged(&update);
        if let Err(e) = next.validate() {
            self.output
                .append_line(&format!("Rejected configuration update: {}", e));
            return Err(e);
        }
        self.output.append_line(&format!(
            "LLM configuration updated: {} ({})",
            next.provider.kind, next.provider.model
        ));
        *config = next;
        Ok(())
    }

    fn prepare(
        &self,
        history: &[Message],
        options: &GenerateOptions,
    ) -> Result<(LlmConfig, Arc<dyn LlmProvider>, ChatRequest, ToolSet), AgentError> {
        let config = self.config();
        let provider = self.factory.create(&config.provider)?;
        let tools = options.tools.clone().unwrap_or_default();

        let request = ChatRequest {
            system: config.system_prompt.clone(),
            messages: history.to_vec(),
            tools: tools.definitions(),
            max_tokens: options.max_tokens.or(config.max_tokens),
            temperature: options.temperature.or(config.temperature),
        };

        self.output.append_line(&format!(
            "Dispatching to {} ({}) with {} messages and {} tools",
            config.provider.kind,
            config.provider.model,
            request.messages.len(),
            tools.len()
        ));
        Ok((config, provider, request, tools))
    }

    /// Generate a complete response, resolving tool calls across steps
    pub async fn generate_response(
        &self,
        history: &[Message],
        options: GenerateOptions,
    ) -> Result<GenerateResponse, AgentError> {
        let (config, provider, mut request, tools) = self.prepare(history, &options)?;
        let label = config.provider.kind.display_name();
        let max_steps = options.max_steps.unwrap_or(DEFAULT_MAX_STEPS).max(1);
        let cancel = options.cancel.as_ref();

        let mut result = GenerateResponse::default();

        for index in 0..max_steps {
            check_cancelled(cancel)?;
            debug!(step = index, "model request");

            let response = match call_provider(provider.as_ref(), &request, cancel, label).await {
                Ok(response) => response,
                Err(e) => {
                    self.output.append_line(&format!("Generation failed: {}", e));
                    return Err(e);
                }
            };

            if let Some(u) = &response.usage {
                result.usage.get_or_insert_with(Usage::default).add(u);
            }

            let mut step = Step {
                index,
                text: response.message.content.clone(),
                tool_calls: response.tool_calls.clone(),
                tool_results: Vec::with_capacity(response.tool_calls.len()),
                usage: response.usage,
            };
            result.content = response.message.content.clone();

            if response.tool_calls.is_empty() {
                result.steps.push(step);
                result.finish_reason = Some(FinishReason::Stop);
                break;
            }

            for call in &response.tool_calls {
                check_cancelled(cancel)?;
                step.tool_results.push(tools.execute(call).await);
            }

            request.messages.push(Message::assistant_with_tools(
                response.message.content,
                response.tool_calls,
            ));
            for tool_result in &step.tool_results {
                request.messages.push(Message::tool_result(tool_result.clone()));
            }

            result.steps.push(step);
            if index + 1 == max_steps {
                warn!(max_steps, "step budget exhausted with pending tool requests");
                result.finish_reason = Some(FinishReason::MaxSteps);
            }
        }

        for step in &result.steps {
            result.tool_calls.extend(step.tool_calls.iter().cloned());
            result.tool_results.extend(step.tool_results.iter().cloned());
        }

        info!(
            steps = result.steps.len(),
            tool_calls = result.tool_calls.len(),
            "generation completed"
        );
        Ok(result)
    }

    /// Generate a response as a lazy stream of text fragments.
    ///
    /// Tool calls requested mid-stream are executed and the following step's
    /// text continues the same stream. Usage is available from the returned
    /// handle once the stream has been drained.
    pub fn generate_streaming_response(
        &self,
        history: &[Message],
        options: GenerateOptions,
    ) -> Result<StreamingResponse, AgentError> {
        let (config, provider, mut request, tools) = self.prepare(history, &options)?;
        let label = config.provider.kind.display_name();
        let max_steps = options.max_steps.unwrap_or(DEFAULT_MAX_STEPS).max(1);
        let cancel = options.cancel;
        let output = Arc::clone(&self.output);

        let usage = UsageHandle::default();
        let handle = usage.clone();

        let stream = async_stream::try_stream! {
            let mut total: Option<Usage> = None;

            for index in 0..max_steps {
                check_cancelled(cancel.as_ref())?;
                debug!(step = index, "streaming model request");

                let mut chunks = match open_stream(provider.as_ref(), &request, cancel.as_ref(), label).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        output.append_line(&format!("Streaming generation failed: {}", e));
                        Err(e)?
                    }
                };

                let mut text = String::new();
                let mut calls = Vec::new();
                while let Some(chunk) = next_chunk(&mut chunks, cancel.as_ref(), label).await? {
                    match chunk {
                        StreamChunk::Text(fragment) => {
                            if fragment.is_empty() {
                                continue;
                            }
                            text.push_str(&fragment);
                            yield fragment;
                        }
                        StreamChunk::ToolCall(call) => calls.push(call),
                        StreamChunk::Done { usage } => {
                            if let Some(u) = usage {
                                total.get_or_insert_with(Usage::default).add(&u);
                            }
                            break;
                        }
                    }
                }

                if calls.is_empty() {
                    break;
                }

                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    check_cancelled(cancel.as_ref())?;
                    results.push(tools.execute(call).await);
                }
                request.messages.push(Message::assistant_with_tools(text, calls));
                for tool_result in results {
                    request.messages.push(Message::tool_result(tool_result));
                }
            }

            handle.finish(total);
        };

        Ok(StreamingResponse {
            stream: Box::pin(stream),
            usage,
        })
    }
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<(), AgentError> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(AgentError::Cancelled),
        _ => Ok(()),
    }
}

fn provider_error(label: &str, e: anyhow::Error) -> AgentError {
    AgentError::Provider(format!("{} generation failed: {:#}", label, e))
}

async fn call_provider(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    cancel: Option<&CancellationToken>,
    label: &str,
) -> Result<LlmResponse, AgentError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(AgentError::Cancelled),
            response = provider.chat(request) => response.map_err(|e| provider_error(label, e)),
        },
        None => provider
            .chat(request)
            .await
            .map_err(|e| provider_error(label, e)),
    }
}

async fn open_stream(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    cancel: Option<&CancellationToken>,
    label: &str,
) -> Result<ChunkStream, AgentError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(AgentError::Cancelled),
            stream = provider.chat_stream(request) => stream.map_err(|e| provider_error(label, e)),
        },
        None => provider
            .chat_stream(request)
            .await
            .map_err(|e| provider_error(label, e)),
    }
}

async fn next_chunk(
    chunks: &mut ChunkStream,
    cancel: Option<&CancellationToken>,
    label: &str,
) -> Result<Option<StreamChunk>, AgentError> {
    let next = match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AgentError::Cancelled),
            next = chunks.next() => next,
        },
        None => chunks.next().await,
    };
    next.transpose().map_err(|e| provider_error(label, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderDescriptor, ProviderKind};
    use crate::tools::{ExecutionContext, ToolRegistry};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct Scripted {
        responses: Mutex<VecDeque<Result<LlmResponse>>>,
        requests: Mutex<Vec<ChatRequest>>,
        cancel_on_chat: Mutex<Option<CancellationToken>>,
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(token) = self.cancel_on_chat.lock().unwrap().as_ref() {
                token.cancel();
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more responses")))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Factory(Arc<Scripted>);

    impl ProviderFactory for Factory {
        fn create(
            &self,
            descriptor: &ProviderDescriptor,
        ) -> Result<Arc<dyn LlmProvider>, AgentError> {
            descriptor.validate()?;
            Ok(self.0.clone())
        }
    }

    fn service(responses: Vec<Result<LlmResponse>>) -> (LlmService, Arc<Scripted>) {
        let scripted = Arc::new(Scripted {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            cancel_on_chat: Mutex::new(None),
        });
        let config = LlmConfig::new(ProviderDescriptor::new(ProviderKind::OpenAI, "gpt-4o", "k"))
            .with_system_prompt("You design UIs");
        let svc = LlmService::with_factory(config, Arc::new(Factory(scripted.clone()))).unwrap();
        (svc, scripted)
    }

    fn glob_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "glob".to_string(),
            arguments: serde_json::json!({"pattern": "*.html"}),
        }
    }

    fn tools(dir: &std::path::Path) -> ToolSet {
        ToolRegistry::with_default_tools().to_provider_format(&ExecutionContext::new(dir, "s"))
    }

    #[test]
    fn construction_validates_config() {
        let config = LlmConfig::new(ProviderDescriptor::new(ProviderKind::Anthropic, "", "k"));
        assert!(matches!(
            LlmService::new(config),
            Err(AgentError::Config(_))
        ));
    }

    #[tokio::test]
    async fn system_prompt_is_sent_with_request() {
        let (svc, scripted) = service(vec![Ok(LlmResponse::text("hi"))]);
        let response = svc
            .generate_response(&[Message::user("hello")], GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "hi");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        let requests = scripted.requests.lock().unwrap();
        assert_eq!(requests[0].system.as_deref(), Some("You design UIs"));
    }

    #[tokio::test]
    async fn tool_calls_are_flattened_across_steps() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, scripted) = service(vec![
            Ok(LlmResponse::with_tool_calls("", vec![glob_call("a"), glob_call("b")])),
            Ok(LlmResponse::with_tool_calls("", vec![glob_call("c")])),
            Ok(LlmResponse::text("done")),
        ]);

        let response = svc
            .generate_response(
                &[Message::user("list designs")],
                GenerateOptions {
                    tools: Some(tools(dir.path())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let per_step: usize = response.steps.iter().map(|s| s.tool_calls.len()).sum();
        assert_eq!(response.tool_calls.len(), per_step);
        assert_eq!(response.tool_calls.len(), 3);
        assert_eq!(response.tool_results.len(), 3);
        assert_eq!(response.steps.len(), 3);
        assert_eq!(response.content, "done");

        // Third request carries user + 2x(assistant, tool results)
        let requests = scripted.requests.lock().unwrap();
        assert_eq!(requests[2].messages.len(), 1 + 3 + 2);
    }

    #[tokio::test]
    async fn step_budget_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(vec![
            Ok(LlmResponse::with_tool_calls("working", vec![glob_call("a")])),
            Ok(LlmResponse::with_tool_calls("still working", vec![glob_call("b")])),
        ]);

        let response = svc
            .generate_response(
                &[Message::user("go")],
                GenerateOptions {
                    tools: Some(tools(dir.path())),
                    max_steps: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(response.steps.len(), 2);
        assert_eq!(response.finish_reason, Some(FinishReason::MaxSteps));
        assert_eq!(response.content, "still working");
    }

    #[tokio::test]
    async fn provider_errors_are_wrapped() {
        let (svc, _) = service(vec![Err(anyhow::anyhow!("rate limited"))]);
        let err = svc
            .generate_response(&[Message::user("x")], GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Provider(_)));
        let text = err.to_string();
        assert!(text.contains("OpenAI generation failed"));
        assert!(text.contains("rate limited"));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_provider_call() {
        let (svc, scripted) = service(vec![Ok(LlmResponse::text("never"))]);
        let token = CancellationToken::new();
        token.cancel();

        let err = svc
            .generate_response(
                &[Message::user("x")],
                GenerateOptions {
                    cancel: Some(token),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Cancelled));
        assert!(scripted.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_provider_call_skips_requested_tools() {
        let dir = tempfile::tempdir().unwrap();
        let write = ToolCall {
            id: "w1".to_string(),
            name: "write_file".to_string(),
            arguments: serde_json::json!({"path": "hero.html", "content": "<h1/>"}),
        };
        let (svc, scripted) = service(vec![
            Ok(LlmResponse::with_tool_calls("", vec![write])),
            Ok(LlmResponse::text("never")),
        ]);
        let token = CancellationToken::new();
        *scripted.cancel_on_chat.lock().unwrap() = Some(token.clone());

        let err = svc
            .generate_response(
                &[Message::user("save a hero")],
                GenerateOptions {
                    tools: Some(tools(dir.path())),
                    cancel: Some(token),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Cancelled));
        assert!(!dir.path().join("hero.html").exists());
        assert_eq!(scripted.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn update_config_keeps_old_config_on_failure() {
        let (svc, _) = service(vec![]);
        let err = svc
            .update_config(LlmConfigUpdate {
                api_key: Some(String::new()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert_eq!(svc.config().provider.api_key, "k");

        svc.update_config(LlmConfigUpdate {
            model: Some("gpt-4o-mini".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(svc.config().provider.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn streaming_usage_is_available_after_drain() {
        let mut response = LlmResponse::text("streamed");
        response.usage = Some(Usage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        });
        let (svc, _) = service(vec![Ok(response)]);

        let streaming = svc
            .generate_streaming_response(&[Message::user("x")], GenerateOptions::default())
            .unwrap();
        assert!(!streaming.usage.is_complete());

        let fragments: Vec<String> = streaming
            .stream
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(fragments.concat(), "streamed");
        assert!(streaming.usage.is_complete());
        assert_eq!(streaming.usage.get().map(|u| u.total_tokens), Some(5));
    }
}
