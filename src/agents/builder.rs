use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{CodingAgent, DESIGN_SYSTEM_PROMPT};
use crate::config::{
    AgentConfig, DEFAULT_MAX_STEPS, DEFAULT_SESSION_MAX_AGE_SECS, LlmConfig, ProviderDescriptor,
    ProviderKind, ToolPolicy,
};
use crate::error::AgentError;
use crate::llm::{LlmCrateFactory, LlmService, ProviderFactory};
use crate::output::{SharedSink, TracingSink};
use crate::tools::{Tool, ToolRegistry};

/// Builder for constructing agents.
///
/// # Example
///
/// ```no_run
/// # use superdesign::{Agent, AgentBuilder, TaskOptions};
/// # async fn example() -> Result<(), superdesign::AgentError> {
/// let agent = AgentBuilder::new()
///     .provider_by_name("anthropic", None)?
///     .default_tools()
///     .build()?;
///
/// let result = agent
///     .execute_task_with_streaming("design a pricing page", TaskOptions::default())
///     .await;
/// println!("{}", result.final_message);
/// # Ok(())
/// # }
/// ```
pub struct AgentBuilder {
    llm_config: Option<LlmConfig>,
    factory: Option<Arc<dyn ProviderFactory>>,
    tools: Option<ToolRegistry>,
    use_default_tools: bool,
    output: Option<SharedSink>,
    working_dir: Option<PathBuf>,
    max_steps: usize,
    session_max_age: Duration,
    system_prompt: Option<String>,
    policy: ToolPolicy,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            llm_config: None,
            factory: None,
            tools: None,
            use_default_tools: false,
            output: None,
            working_dir: None,
            max_steps: DEFAULT_MAX_STEPS,
            session_max_age: Duration::from_secs(DEFAULT_SESSION_MAX_AGE_SECS),
            system_prompt: None,
            policy: ToolPolicy::default(),
        }
    }

    /// Use a provider descriptor with default generation settings
    pub fn provider(self, descriptor: ProviderDescriptor) -> Self {
        self.llm_config(LlmConfig::new(descriptor))
    }

    /// Use a full LLM service configuration
    pub fn llm_config(mut self, config: LlmConfig) -> Self {
        self.llm_config = Some(config);
        self
    }

    /// Configure a provider by name, reading its credential from the environment.
    ///
    /// If `model` is `None`, the provider's default model is used.
    pub fn provider_by_name(self, name: &str, model: Option<&str>) -> Result<Self, AgentError> {
        let kind: ProviderKind = name.parse()?;
        Ok(self.provider(ProviderDescriptor::from_env(kind, model)))
    }

    /// Set a custom provider factory (defaults to the `llm` crate backends)
    pub fn factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Register the built-in file tools
    pub fn default_tools(mut self) -> Self {
        self.use_default_tools = true;
        self
    }

    /// Set a custom tool registry (overrides default tools)
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self.use_default_tools = false;
        self
    }

    /// Add a single tool to the registry.
    ///
    /// If no tools have been set yet, starts with an empty registry.
    pub fn add_tool(mut self, tool: impl Tool + 'static) -> Self {
        let registry = self.tools.get_or_insert_with(ToolRegistry::new);
        registry.register(tool);
        self
    }

    /// Host sink for diagnostic lines
    pub fn output(mut self, output: SharedSink) -> Self {
        self.output = Some(output);
        self
    }

    /// Default project root (defaults to the current directory)
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    /// Replace the built-in design prompt
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn policy(mut self, policy: ToolPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply settings from the configuration files.
    ///
    /// Loads config with precedence: project file > global file > defaults.
    /// Settings applied here can still be overridden by subsequent builder calls.
    pub fn from_config(self) -> Result<Self, AgentError> {
        let config = AgentConfig::load()
            .map_err(|e| AgentError::Config(format!("failed to load configuration: {:#}", e)))?;
        debug!("loaded agent configuration");
        self.with_config(&config)
    }

    /// Apply an already loaded configuration
    pub fn with_config(mut self, config: &AgentConfig) -> Result<Self, AgentError> {
        self.llm_config = Some(config.llm_config()?);
        self.max_steps = config.max_steps;
        self.session_max_age = Duration::from_secs(config.session_max_age_secs);
        self.policy = config.policy.clone();
        Ok(self)
    }

    /// Build a [`CodingAgent`].
    ///
    /// Fails if no provider has been configured or its configuration is invalid.
    pub fn build(self) -> Result<CodingAgent, AgentError> {
        let mut config = self
            .llm_config
            .ok_or_else(|| AgentError::Config("no LLM provider configured".to_string()))?;

        if let Some(prompt) = self.system_prompt {
            config.system_prompt = Some(prompt);
        } else if config.system_prompt.is_none() {
            config.system_prompt = Some(DESIGN_SYSTEM_PROMPT.to_string());
        }

        let output = self.output.unwrap_or_else(|| Arc::new(TracingSink));
        let factory = self.factory.unwrap_or_else(|| Arc::new(LlmCrateFactory));
        let llm = LlmService::with_factory(config, factory)?.with_output(Arc::clone(&output));

        let tools = if let Some(tools) = self.tools {
            tools
        } else if self.use_default_tools {
            ToolRegistry::with_default_tools()
        } else {
            ToolRegistry::new()
        };

        let working_dir = match self.working_dir {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(|e| {
                AgentError::Config(format!("failed to read current directory: {}", e))
            })?,
        };

        debug!(
            tools = ?tools.list_tools(),
            working_dir = %working_dir.display(),
            max_steps = self.max_steps,
            "building coding agent"
        );

        Ok(CodingAgent::from_parts(
            llm,
            tools,
            working_dir,
            self.max_steps,
            self.session_max_age,
            output,
            self.policy,
        ))
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Agent;

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor::new(ProviderKind::OpenAI, "gpt-4o", "sk-test")
    }

    #[test]
    fn build_requires_provider() {
        let err = AgentBuilder::new().build().err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn build_rejects_missing_credential() {
        let err = AgentBuilder::new()
            .provider(ProviderDescriptor::new(ProviderKind::Google, "gemini-2.0-flash", ""))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn unknown_provider_name_fails() {
        let err = AgentBuilder::new()
            .provider_by_name("cohere", None)
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::UnknownProvider(_)));
    }

    #[test]
    fn defaults_apply() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentBuilder::new()
            .provider(descriptor())
            .default_tools()
            .working_dir(dir.path())
            .build()
            .unwrap();

        assert!(agent.is_ready());
        assert_eq!(agent.working_dir(), dir.path());
        assert_eq!(
            agent.tools().list_tools(),
            vec!["edit_file", "glob", "read_file", "write_file"]
        );
        assert_eq!(
            agent.llm().config().system_prompt.as_deref(),
            Some(DESIGN_SYSTEM_PROMPT)
        );
    }

    #[test]
    fn explicit_prompt_and_config_values_win() {
        let config = AgentConfig {
            provider: Some("openai".to_string()),
            api_key: Some("sk-file".to_string()),
            max_steps: 4,
            ..Default::default()
        };
        let agent = AgentBuilder::new()
            .with_config(&config)
            .unwrap()
            .system_prompt("Only answer in haiku")
            .working_dir(".")
            .build()
            .unwrap();

        let llm = agent.llm().config();
        assert_eq!(llm.provider.api_key, "sk-file");
        assert_eq!(llm.system_prompt.as_deref(), Some("Only answer in haiku"));
        assert!(agent.tools().is_empty());
    }
}
