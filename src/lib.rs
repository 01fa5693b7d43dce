pub mod agents;
pub mod config;
pub mod error;
pub mod llm;
pub mod message;
pub mod output;
pub mod session;
pub mod tools;

pub use agents::{
    Agent, AgentBuilder, CodingAgent, DelegatingAgent, ExternalAgentService, MessageCallback,
    TaskOptions, TaskResult,
};
pub use config::{AgentConfig, LlmConfig, LlmConfigUpdate, ProviderDescriptor, ProviderKind, ToolPolicy};
pub use error::AgentError;
pub use llm::{
    GenerateOptions, GenerateResponse, LlmProvider, LlmResponse, LlmService, Message, MessageRole,
    ProviderFactory, ToolCall, ToolResult,
};
pub use message::{MessageContent, SdkMessage, SdkMessageType};
pub use output::{BufferSink, OutputSink, SharedSink, TracingSink};
pub use session::{AgentSession, ConversationTurn, SessionStore};
pub use tools::{
    EditFileTool, ExecutionContext, GlobTool, ReadFileTool, Tool, ToolRegistry, ToolSet,
    WriteFileTool,
};
