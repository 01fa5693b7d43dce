#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown provider: {0} (expected: openai, anthropic, google, openrouter)")]
    UnknownProvider(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("tool error: {tool_name}: {message}")]
    Tool { tool_name: String, message: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
