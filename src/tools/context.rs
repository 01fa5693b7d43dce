use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ToolPolicy;
use crate::output::{SharedSink, TracingSink};

/// Per-task environment handed to every tool invocation
#[derive(Clone)]
pub struct ExecutionContext {
    /// Project root the task runs against
    pub working_dir: PathBuf,
    /// Host log sink
    pub output: SharedSink,
    pub session_id: String,
    pub policy: Arc<ToolPolicy>,
}

impl ExecutionContext {
    pub fn new(working_dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            output: Arc::new(TracingSink),
            session_id: session_id.into(),
            policy: Arc::new(ToolPolicy::default()),
        }
    }

    pub fn with_output(mut self, output: SharedSink) -> Self {
        self.output = output;
        self
    }

    pub fn with_policy(mut self, policy: Arc<ToolPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Write a line to the host sink, tagged with the session
    pub fn log(&self, line: impl AsRef<str>) {
        self.output
            .append_line(&format!("[{}] {}", self.session_id, line.as_ref()));
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("working_dir", &self.working_dir)
            .field("session_id", &self.session_id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
