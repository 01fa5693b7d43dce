use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{Agent, AgentBuilder, MessageCallback, TaskOptions, TaskResult, default_session_id};
use crate::config::{LlmConfigUpdate, ToolPolicy};
use crate::error::AgentError;
use crate::llm::{GenerateOptions, LlmService, Message};
use crate::message::{
    SdkMessage, calculate_total_cost, create_assistant_message, create_error_message,
    create_result_message, create_tool_call_message, create_tool_result_message,
    create_user_message,
};
use crate::output::SharedSink;
use crate::session::{ConversationTurn, SessionStore, SharedSession, lock};
use crate::tools::{ExecutionContext, ToolRegistry};

const COMPLETED_MESSAGE: &str = "Task completed";

/// Agent driving the LLM service with the tool registry.
///
/// Each task appends to its session's history, runs the model through the
/// service's tool loop, and reports every step as uniform messages.
pub struct CodingAgent {
    llm: LlmService,
    tools: ToolRegistry,
    sessions: SessionStore,
    working_dir: PathBuf,
    max_steps: usize,
    session_max_age: Duration,
    output: SharedSink,
    policy: Arc<ToolPolicy>,
}

/// Messages and tools accumulated while a task runs
struct TaskRun {
    session_id: String,
    started: Instant,
    messages: Vec<SdkMessage>,
    tools_used: Vec<String>,
    on_message: Option<MessageCallback>,
}

impl TaskRun {
    fn new(session_id: String, on_message: Option<MessageCallback>) -> Self {
        Self {
            session_id,
            started: Instant::now(),
            messages: Vec::new(),
            tools_used: Vec::new(),
            on_message,
        }
    }

    fn emit(&mut self, message: SdkMessage) {
        if let Some(callback) = &self.on_message {
            callback(&message);
        }
        self.messages.push(message);
    }

    fn use_tool(&mut self, name: &str) {
        if !self.tools_used.iter().any(|t| t == name) {
            self.tools_used.push(name.to_string());
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn finish(self, final_message: String) -> TaskResult {
        TaskResult {
            success: true,
            duration_ms: self.elapsed_ms(),
            total_cost: calculate_total_cost(&self.messages),
            messages: self.messages,
            final_message,
            tools_used: self.tools_used,
            error: None,
        }
    }

    fn fail(mut self, err: AgentError) -> TaskResult {
        let text = err.to_string();
        let message = create_error_message(&text, &self.session_id);
        self.emit(message);
        TaskResult {
            success: false,
            duration_ms: self.elapsed_ms(),
            total_cost: calculate_total_cost(&self.messages),
            messages: self.messages,
            final_message: text.clone(),
            tools_used: self.tools_used,
            error: Some(text),
        }
    }
}

impl CodingAgent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub(super) fn from_parts(
        llm: LlmService,
        tools: ToolRegistry,
        working_dir: PathBuf,
        max_steps: usize,
        session_max_age: Duration,
        output: SharedSink,
        policy: ToolPolicy,
    ) -> Self {
        Self {
            llm,
            tools,
            sessions: SessionStore::new(),
            working_dir,
            max_steps,
            session_max_age,
            output,
            policy: Arc::new(policy),
        }
    }

    pub fn llm(&self) -> &LlmService {
        &self.llm
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Default project root for tasks that don't name one
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Fetch or lazily create a session. Repeated calls return the same handle.
    pub fn get_session(&self, id: &str, working_dir: &Path) -> SharedSession {
        self.sessions.get_or_create(id, working_dir)
    }

    /// Look up a session without creating it
    pub fn session(&self, id: &str) -> Option<SharedSession> {
        self.sessions.get(id)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Evict sessions idle for longer than `max_age`; returns how many were removed
    pub fn cleanup_sessions(&self, max_age: Duration) -> usize {
        let evicted = self.sessions.evict_idle(max_age);
        if evicted > 0 {
            self.output
                .append_line(&format!("Cleaned up {} idle sessions", evicted));
        }
        evicted
    }

    /// Evict sessions idle for longer than the configured maximum age
    pub fn cleanup_idle_sessions(&self) -> usize {
        self.cleanup_sessions(self.session_max_age)
    }

    /// Reconfigure the LLM service; the old configuration stays on failure
    pub fn update_llm_config(&self, update: LlmConfigUpdate) -> Result<(), AgentError> {
        self.llm.update_config(update)
    }

    /// Continue an existing session.
    ///
    /// Fails with [`AgentError::SessionNotFound`] when no session has that id;
    /// no session is created in that case.
    pub async fn continue_conversation(
        &self,
        message: &str,
        conversation_id: &str,
        options: TaskOptions,
    ) -> Result<TaskResult, AgentError> {
        let session = self
            .sessions
            .get(conversation_id)
            .ok_or_else(|| AgentError::SessionNotFound(conversation_id.to_string()))?;

        let working_dir = {
            let mut session = lock(&session);
            session.touch();
            session.working_dir.clone()
        };

        let working_dir = options.working_dir.clone().unwrap_or(working_dir);
        let options = TaskOptions {
            session_id: Some(conversation_id.to_string()),
            ..options
        };
        let result = self
            .execute_in_session(message, Arc::clone(&session), &working_dir, options)
            .await;

        lock(&session).record_turn(ConversationTurn::new(message, &result.final_message));
        if self.sessions.reinstate(conversation_id, &session) {
            info!(session_id = %conversation_id, "session was evicted during the turn, restored");
        }
        Ok(result)
    }

    /// Run a task against an already resolved session
    async fn execute_in_session(
        &self,
        request: &str,
        session: SharedSession,
        working_dir: &Path,
        options: TaskOptions,
    ) -> TaskResult {
        let session_id = lock(&session).id.clone();

        info!(session_id = %session_id, working_dir = %working_dir.display(), "task started");
        self.output
            .append_line(&format!("[{}] Task started: {}", session_id, request));

        let mut run = TaskRun::new(session_id, options.on_message.clone());
        match self
            .run_task(request, &session, working_dir, &options, &mut run)
            .await
        {
            Ok(final_message) => {
                let result = run.finish(final_message);
                info!(
                    messages = result.messages.len(),
                    tools = ?result.tools_used,
                    duration_ms = result.duration_ms,
                    "task completed"
                );
                result
            }
            Err(e) => {
                error!(session_id = %run.session_id, error = %e, "task failed");
                self.output
                    .append_line(&format!("[{}] Task failed: {}", run.session_id, e));
                run.fail(e)
            }
        }
    }

    async fn run_task(
        &self,
        request: &str,
        session: &SharedSession,
        working_dir: &Path,
        options: &TaskOptions,
        run: &mut TaskRun,
    ) -> Result<String, AgentError> {
        let session_id = run.session_id.clone();

        let history = {
            let mut session = lock(session);
            session.add_message(Message::user(request).stamped());
            session.history.clone()
        };
        run.emit(create_user_message(request, &session_id));

        let ctx = ExecutionContext::new(working_dir, &session_id)
            .with_output(Arc::clone(&self.output))
            .with_policy(Arc::clone(&self.policy));
        let tools = self.tools.to_provider_format(&ctx);
        debug!(session_id = %session_id, tools = ?tools.names(), "generating");

        let response = self
            .llm
            .generate_response(
                &history,
                GenerateOptions {
                    max_steps: Some(options.max_steps.unwrap_or(self.max_steps)),
                    tools: (!tools.is_empty()).then_some(tools),
                    cancel: options.cancel.clone(),
                    ..Default::default()
                },
            )
            .await?;

        if !response.content.is_empty() {
            lock(session).add_message(Message::assistant(&response.content).stamped());
            let elapsed = run.elapsed_ms();
            run.emit(create_assistant_message(
                &response.content,
                &session_id,
                Some(elapsed),
            ));
        }

        for step in &response.steps {
            for call in &step.tool_calls {
                debug!(session_id = %session_id, step = step.index, tool = %call.name, "tool call");
                run.emit(create_tool_call_message(
                    &json!({
                        "toolCallId": call.id,
                        "toolName": call.name,
                        "args": call.arguments,
                    }),
                    &session_id,
                ));
                run.use_tool(&call.name);
            }
            for result in &step.tool_results {
                run.emit(create_tool_result_message(
                    &json!({
                        "toolCallId": result.tool_call_id,
                        "toolName": result.tool_name,
                        "result": result.result,
                        "isError": result.is_error,
                    }),
                    &session_id,
                ));
            }
        }

        let final_message = if !response.content.is_empty() {
            response.content
        } else {
            run.messages
                .iter()
                .rev()
                .find_map(SdkMessage::assistant_text)
                .unwrap_or(COMPLETED_MESSAGE)
                .to_string()
        };
        Ok(final_message)
    }
}

#[async_trait]
impl Agent for CodingAgent {
    fn name(&self) -> &str {
        "coding"
    }

    fn is_ready(&self) -> bool {
        self.llm.config().validate().is_ok()
    }

    async fn execute_task_with_streaming(
        &self,
        request: &str,
        options: TaskOptions,
    ) -> TaskResult {
        let session_id = options
            .session_id
            .clone()
            .unwrap_or_else(default_session_id);
        let working_dir = options
            .working_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.clone());
        let session = self.sessions.get_or_create(&session_id, &working_dir);
        self.execute_in_session(request, session, &working_dir, options)
            .await
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
        if cancel.is_some() {
            options.cancel = cancel;
        }
        if on_message.is_some() {
            options.on_message = on_message;
        }
        let callback = options.on_message.clone();

        let result = self.execute_task_with_streaming(prompt, options).await;
        let mut messages = result.messages;
        if result.success {
            let summary = create_result_message(
                result.final_message,
                &session_id,
                result.duration_ms,
                result.total_cost,
            );
            if let Some(callback) = &callback {
                callback(&summary);
            }
            messages.push(summary);
        }
        messages
    }
}
