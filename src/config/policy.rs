use serde::{Deserialize, Serialize};

/// Path policy applied by the built-in file tools.
///
/// Tools always have access to the task's working directory. Paths outside
/// it are rejected unless they fall under one of `allow_paths`. Anything under
/// `deny_paths` is rejected even inside the working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Extra roots the tools may touch besides the working directory
    #[serde(default)]
    pub allow_paths: Vec<String>,

    /// Roots the tools may never touch
    #[serde(default)]
    pub deny_paths: Vec<String>,
}
