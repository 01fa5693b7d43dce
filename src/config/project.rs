use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LlmConfig, ProviderDescriptor, ProviderKind, ToolPolicy};

/// Directory holding per-project agent files
pub const PROJECT_DIR: &str = ".superdesign";

/// Name of the config file inside [`PROJECT_DIR`]
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_MAX_STEPS: usize = 25;

pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Agent configuration as read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Provider name (openai, anthropic, google, openrouter)
    pub provider: Option<String>,

    /// Model identifier; defaults per provider
    pub model: Option<String>,

    /// Credential; falls back to the provider's environment variable
    pub api_key: Option<String>,

    /// Upper bound on model round-trips per task
    pub max_steps: usize,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,

    /// Replaces the built-in design agent prompt
    pub system_prompt: Option<String>,

    /// Idle age after which sessions are evicted
    pub session_max_age_secs: u64,

    pub policy: ToolPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            api_key: None,
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: None,
            temperature: None,
            system_prompt: None,
            session_max_age_secs: DEFAULT_SESSION_MAX_AGE_SECS,
            policy: ToolPolicy::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration with precedence: project file > global file > defaults.
    ///
    /// `SUPERDESIGN_PROVIDER` and `SUPERDESIGN_MODEL` override the files.
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let global = std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(PROJECT_DIR).join(CONFIG_FILE));
        let project = cwd.join(PROJECT_DIR).join(CONFIG_FILE);

        let mut config = match (project.exists(), global) {
            (true, _) => Self::from_file(&project)?,
            (false, Some(global)) if global.exists() => Self::from_file(&global)?,
            _ => Self::default(),
        };

        if let Ok(provider) = std::env::var("SUPERDESIGN_PROVIDER") {
            config.override_provider(provider);
        }
        if let Ok(model) = std::env::var("SUPERDESIGN_MODEL") {
            config.model = Some(model);
        }

        Ok(config)
    }

    /// Replace the provider name. A configured credential and model belong
    /// to the old provider, so both are dropped when the provider changes.
    pub fn override_provider(&mut self, provider: impl Into<String>) {
        let provider = provider.into();
        let changed = match (self.provider_kind(), provider.parse::<ProviderKind>()) {
            (Ok(old), Ok(new)) => old != new,
            _ => true,
        };
        if changed {
            self.api_key = None;
            self.model = None;
        }
        self.provider = Some(provider);
    }

    /// Read a single config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        debug!(path = %path.display(), "loaded agent config");
        Ok(config)
    }

    /// Resolve the provider kind, defaulting to Anthropic
    pub fn provider_kind(&self) -> Result<ProviderKind, crate::AgentError> {
        match &self.provider {
            Some(name) => name.parse(),
            None => Ok(ProviderKind::default()),
        }
    }

    /// Build the service configuration; the credential is read, never written
    pub fn llm_config(&self) -> Result<LlmConfig, crate::AgentError> {
        let kind = self.provider_kind()?;
        let mut descriptor = ProviderDescriptor::from_env(kind, self.model.as_deref());
        if let Some(key) = &self.api_key {
            descriptor.api_key = key.clone();
        }

        Ok(LlmConfig {
            provider: descriptor,
            system_prompt: self.system_prompt.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_full_config() {
        let text = r#"
provider = "openrouter"
model = "anthropic/claude-3.5-sonnet"
api_key = "or-key"
max_steps = 10
temperature = 0.3
session_max_age_secs = 3600

[policy]
allow_paths = ["/tmp/shared"]
"#;
        let config: AgentConfig = toml::from_str(text).unwrap();
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.session_max_age_secs, 3600);
        assert_eq!(config.policy.allow_paths, vec!["/tmp/shared"]);

        let llm = config.llm_config().unwrap();
        assert_eq!(llm.provider.kind, ProviderKind::OpenRouter);
        assert_eq!(llm.provider.model, "anthropic/claude-3.5-sonnet");
        assert_eq!(llm.provider.api_key, "or-key");
        assert_eq!(llm.temperature, Some(0.3));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(config.provider_kind().unwrap(), ProviderKind::Anthropic);
    }

    #[test]
    fn unknown_provider_is_reported() {
        let config = AgentConfig {
            provider: Some("cohere".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.llm_config(),
            Err(crate::AgentError::UnknownProvider(_))
        ));
    }

    #[test]
    fn provider_override_drops_file_credential() {
        let mut config = AgentConfig {
            provider: Some("openai".to_string()),
            model: Some("gpt-4o".to_string()),
            api_key: Some("sk-openai-secret".to_string()),
            ..Default::default()
        };
        config.override_provider("anthropic");

        assert_eq!(config.provider.as_deref(), Some("anthropic"));
        assert!(config.api_key.is_none());
        assert!(config.model.is_none());
        let llm = config.llm_config().unwrap();
        assert_ne!(llm.provider.api_key, "sk-openai-secret");
        assert_eq!(llm.provider.model, ProviderKind::Anthropic.default_model());
    }

    #[test]
    fn provider_override_with_same_kind_keeps_credential() {
        let mut config = AgentConfig {
            provider: Some("openai".to_string()),
            api_key: Some("sk-openai".to_string()),
            ..Default::default()
        };
        config.override_provider("OpenAI");
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider = \"google\"\nmax_steps = 3").unwrap();

        let config = AgentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.provider.as_deref(), Some("google"));
        assert_eq!(config.max_steps, 3);
    }

    #[test]
    fn from_file_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_steps = \"many\"").unwrap();

        let err = AgentConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }
}
