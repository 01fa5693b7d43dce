mod policy;
mod project;
mod provider;

pub use policy::ToolPolicy;
pub use project::{
    AgentConfig, CONFIG_FILE, DEFAULT_MAX_STEPS, DEFAULT_SESSION_MAX_AGE_SECS, PROJECT_DIR,
};
pub use provider::{LlmConfig, LlmConfigUpdate, ProviderDescriptor, ProviderKind};
