mod backend;
mod message;
mod provider;
mod service;

pub use backend::{LlmCrateFactory, LlmCrateProvider};
pub use message::{Message, MessageRole, ToolCall, ToolResult};
pub use provider::{
    ChatRequest, ChunkStream, FinishReason, LlmProvider, LlmResponse, ProviderFactory,
    StreamChunk, ToolDefinition, Usage,
};
pub use service::{
    GenerateOptions, GenerateResponse, LlmService, Step, StreamingResponse, TextStream,
    UsageHandle,
};
