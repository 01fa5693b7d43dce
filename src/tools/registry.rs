use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{EditFileTool, ExecutionContext, GlobTool, ReadFileTool, Tool, WriteFileTool};
use crate::error::AgentError;
use crate::llm::{ToolCall, ToolDefinition, ToolResult};

/// Registry for tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry with the built-in design workspace tools
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(ReadFileTool);
        registry.register(WriteFileTool);
        registry.register(EditFileTool);
        registry.register(GlobTool);
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Names of every registered tool, sorted
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Bind every tool to an execution context, ready to hand to the model
    pub fn to_provider_format(&self, ctx: &ExecutionContext) -> ToolSet {
        let tools = self
            .tools
            .iter()
            .map(|(name, tool)| {
                let bound = BoundTool {
                    definition: ToolDefinition {
                        name: name.clone(),
                        description: tool.description().to_string(),
                        parameters: tool.schema(),
                    },
                    tool: Arc::clone(tool),
                    context: ctx.clone(),
                };
                (name.clone(), bound)
            })
            .collect();
        ToolSet { tools }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A tool bound to the context it will run in
#[derive(Clone)]
pub struct BoundTool {
    pub definition: ToolDefinition,
    tool: Arc<dyn Tool>,
    context: ExecutionContext,
}

impl BoundTool {
    pub async fn execute(&self, arguments: serde_json::Value) -> Result<String, AgentError> {
        self.tool
            .execute(arguments, &self.context)
            .await
            .map_err(|e| AgentError::Tool {
                tool_name: self.definition.name.clone(),
                message: format!("{:#}", e),
            })
    }
}

/// Tools available to one generation request, keyed by name
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, BoundTool>,
}

impl ToolSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&BoundTool> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Definitions in a stable order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    /// Run a requested call. Failures and unknown tools become error results.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::failure(call, format!("unknown tool '{}'", call.name));
        };

        debug!(tool = %call.name, id = %call.id, "executing tool");
        match tool.execute(call.arguments.clone()).await {
            Ok(output) => ToolResult::success(call, output),
            Err(e) => {
                tool.context.log(e.to_string());
                let message = match e {
                    AgentError::Tool { message, .. } => message,
                    other => other.to_string(),
                };
                ToolResult::failure(call, message)
            }
        }
    }
}
