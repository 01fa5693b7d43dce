use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    #[default]
    Anthropic,
    Google,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAI,
        ProviderKind::Anthropic,
        ProviderKind::Google,
        ProviderKind::OpenRouter,
    ];

    /// Environment variable the credential is read from when not configured
    pub fn credential_env_var(self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    /// Model used when none is configured
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Google => "gemini-2.5-pro",
            Self::OpenRouter => "anthropic/claude-sonnet-4",
        }
    }

    /// Human readable name used in error messages
    pub fn display_name(self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Google => "Google",
            Self::OpenRouter => "OpenRouter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Google => write!(f, "google"),
            Self::OpenRouter => write!(f, "openrouter"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(AgentError::UnknownProvider(s.to_string())),
        }
    }
}

/// Which provider, which model, and the credential to reach it
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
}

impl ProviderDescriptor {
    pub fn new(kind: ProviderKind, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Build a descriptor whose credential comes from the provider's env var.
    ///
    /// The variable is only read. A missing variable yields an empty
    /// credential, which fails validation.
    pub fn from_env(kind: ProviderKind, model: Option<&str>) -> Self {
        let api_key = std::env::var(kind.credential_env_var()).unwrap_or_default();
        Self::new(kind, model.unwrap_or(kind.default_model()), api_key)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.api_key.trim().is_empty() {
            return Err(AgentError::Config(format!(
                "missing API key for {} (set {} or api_key in config)",
                self.kind,
                self.kind.credential_env_var()
            )));
        }
        if self.model.trim().is_empty() {
            return Err(AgentError::Config(format!(
                "missing model id for {}",
                self.kind
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Configuration of an LLM service instance
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: ProviderDescriptor,
    /// Prepended to every request when set
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmConfig {
    pub fn new(provider: ProviderDescriptor) -> Self {
        Self {
            provider,
            system_prompt: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        self.provider.validate()?;
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AgentError::Config(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    t
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(AgentError::Config("max_tokens must be positive".to_string()));
        }
        Ok(())
    }

    /// Merge a partial update into a copy of this config.
    ///
    /// Switching provider without naming a model falls back to the new
    /// provider's default model. Switching without a credential reads the
    /// new provider's env var; the old credential is never carried over.
    pub fn merged(&self, update: &LlmConfigUpdate) -> Self {
        let mut next = self.clone();
        if let Some(kind) = update.provider {
            if kind != next.provider.kind {
                let fresh = ProviderDescriptor::from_env(kind, None);
                if update.model.is_none() {
                    next.provider.model = fresh.model;
                }
                if update.api_key.is_none() {
                    next.provider.api_key = fresh.api_key;
                }
            }
            next.provider.kind = kind;
        }
        if let Some(model) = &update.model {
            next.provider.model = model.clone();
        }
        if let Some(key) = &update.api_key {
            next.provider.api_key = key.clone();
        }
        if let Some(prompt) = &update.system_prompt {
            next.system_prompt = Some(prompt.clone());
        }
        if let Some(max_tokens) = update.max_tokens {
            next.max_tokens = Some(max_tokens);
        }
        if let Some(temperature) = update.temperature {
            next.temperature = Some(temperature);
        }
        next
    }
}

/// Partial configuration change; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmConfigUpdate {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}
