use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Agent, MessageCallback, TaskOptions, TaskResult, default_session_id};
use crate::error::AgentError;
use crate::message::{SdkMessage, calculate_total_cost, create_error_message};

/// An agent service living outside this crate that already speaks uniform messages
#[async_trait]
pub trait ExternalAgentService: Send + Sync {
    fn name(&self) -> &str;

    fn is_ready(&self) -> bool {
        true
    }

    async fn query(
        &self,
        prompt: &str,
        options: &TaskOptions,
        cancel: Option<CancellationToken>,
        on_message: Option<MessageCallback>,
    ) -> Result<Vec<SdkMessage>, AgentError>;
}

/// Agent that forwards every task to an [`ExternalAgentService`]
pub struct DelegatingAgent<S> {
    service: S,
}

impl<S: ExternalAgentService> DelegatingAgent<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }
}

#[async_trait]
impl<S: ExternalAgentService> Agent for DelegatingAgent<S> {
    fn name(&self) -> &str {
        self.service.name()
    }

    fn is_ready(&self) -> bool {
        self.service.is_ready()
    }

    async fn execute_task_with_streaming(
        &self,
        request: &str,
        options: TaskOptions,
    ) -> TaskResult {
        let started = Instant::now();
        let messages = self.query(request, options, None, None).await;
        summarize(messages, started.elapsed().as_millis() as u64)
    }

    async fn query(
        &self,
        prompt: &str,
        mut options: TaskOptions,
        cancel: Option<CancellationToken>,
        on_message: Option<MessageCallback>,
    ) -> Vec<SdkMessage> {
        let session_id = options
            .session_id
            .get_or_insert_with(default_session_id)
            .clone();
        let cancel = cancel.or_else(|| options.cancel.clone());
        let on_message = on_message.or_else(|| options.on_message.clone());

        match self
            .service
            .query(prompt, &options, cancel, on_message.clone())
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(agent = self.service.name(), error = %e, "external agent failed");
                let message = create_error_message(&e, &session_id);
                if let Some(callback) = &on_message {
                    callback(&message);
                }
                vec![message]
            }
        }
    }
}

/// Fold a forwarded message list into a task result
fn summarize(messages: Vec<SdkMessage>, duration_ms: u64) -> TaskResult {
    let mut tools_used: Vec<String> = Vec::new();
    for name in messages.iter().filter_map(SdkMessage::tool_name) {
        if !tools_used.iter().any(|t| t == name) {
            tools_used.push(name.to_string());
        }
    }

    let failure = messages
        .last()
        .filter(|m| m.is_error_result())
        .map(|m| m.content.as_text().unwrap_or("external agent failed").to_string());

    let final_message = match &failure {
        Some(error) => error.clone(),
        None => messages
            .iter()
            .rev()
            .find_map(|m| m.assistant_text().or_else(|| result_text(m)))
            .unwrap_or("Task completed")
            .to_string(),
    };

    TaskResult {
        success: failure.is_none(),
        total_cost: calculate_total_cost(&messages),
        messages,
        final_message,
        tools_used,
        duration_ms,
        error: failure,
    }
}

fn result_text(message: &SdkMessage) -> Option<&str> {
    if message.kind == crate::message::SdkMessageType::Result {
        message.content.as_text()
    } else {
        None
    }
}
