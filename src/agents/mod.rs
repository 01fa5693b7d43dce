mod builder;
mod coding;
mod delegating;
mod prompt;

pub use builder::AgentBuilder;
pub use coding::CodingAgent;
pub use delegating::{DelegatingAgent, ExternalAgentService};
pub use prompt::DESIGN_SYSTEM_PROMPT;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::message::SdkMessage;

/// Receives every uniform message as soon as it is emitted
pub type MessageCallback = Arc<dyn Fn(&SdkMessage) + Send + Sync>;

/// Per-task options
#[derive(Clone, Default)]
pub struct TaskOptions {
    /// Session to run in; defaults to `session_<unix millis>`
    pub session_id: Option<String>,
    /// Project root for this task; defaults to the agent's working directory
    pub working_dir: Option<PathBuf>,
    /// Upper bound on model round-trips
    pub max_steps: Option<usize>,
    pub cancel: Option<CancellationToken>,
    pub on_message: Option<MessageCallback>,
}

impl TaskOptions {
    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn on_message(mut self, callback: impl Fn(&SdkMessage) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOptions")
            .field("session_id", &self.session_id)
            .field("working_dir", &self.working_dir)
            .field("max_steps", &self.max_steps)
            .field("cancellable", &self.cancel.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

/// Outcome of one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub success: bool,
    /// Every uniform message emitted, in order
    pub messages: Vec<SdkMessage>,
    pub final_message: String,
    /// Tool names in first-use order, without duplicates
    pub tools_used: Vec<String>,
    pub duration_ms: u64,
    pub total_cost: Option<f64>,
    pub error: Option<String>,
}

/// Default session id for tasks that don't name one
pub fn default_session_id() -> String {
    format!("session_{}", chrono::Utc::now().timestamp_millis())
}

/// Capabilities shared by every agent implementation
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the agent is configured well enough to take tasks
    fn is_ready(&self) -> bool;

    /// Run one task. Never fails: errors are reported in the result.
    async fn execute_task_with_streaming(&self, request: &str, options: TaskOptions)
    -> TaskResult;

    /// Run one task against `project_path`
    async fn execute_task(
        &self,
        request: &str,
        project_path: &Path,
        options: TaskOptions,
    ) -> TaskResult {
        let options = options.working_dir(project_path);
        self.execute_task_with_streaming(request, options).await
    }

    /// Legacy entry point returning only the message list.
    ///
    /// Never fails; callers check the last message for an error result.
    async fn query(
        &self,
        prompt: &str,
        options: TaskOptions,
        cancel: Option<CancellationToken>,
        on_message: Option<MessageCallback>,
    ) -> Vec<SdkMessage>;
}
