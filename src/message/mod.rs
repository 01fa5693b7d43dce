//! Uniform message representation exchanged between agents and their UI.
//!
//! One model turn expands into several uniform messages: the assistant text,
//! one message per tool call, and one per tool result. The [`adapter`]
//! functions build them from provider-shaped data.

pub mod adapter;

pub use adapter::{
    calculate_total_cost, conversation_history, create_assistant_message, create_error_message,
    create_result_message, create_system_message, create_tool_call_message,
    create_tool_result_message, create_user_message,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SUBTYPE_TOOL_USE: &str = "tool_use";
pub const SUBTYPE_TOOL_RESULT: &str = "tool_result";
pub const SUBTYPE_ERROR: &str = "error";
pub const SUBTYPE_SUCCESS: &str = "success";

/// Kind of uniform message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkMessageType {
    User,
    Assistant,
    System,
    Result,
}

/// Message body: plain text or structured data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(Value),
}

impl MessageContent {
    /// Text body, if this is a text message
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Normalized message as seen by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkMessage {
    #[serde(rename = "type")]
    pub kind: SdkMessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub content: MessageContent,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub is_error: bool,
}

impl SdkMessage {
    pub(crate) fn new(
        kind: SdkMessageType,
        content: MessageContent,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subtype: None,
            content,
            session_id: session_id.into(),
            parent_tool_use_id: None,
            duration_ms: None,
            total_cost_usd: None,
            is_error: false,
        }
    }

    pub fn has_subtype(&self, subtype: &str) -> bool {
        self.subtype.as_deref() == Some(subtype)
    }

    /// A `result` message carrying a failure
    pub fn is_error_result(&self) -> bool {
        self.kind == SdkMessageType::Result && (self.is_error || self.has_subtype(SUBTYPE_ERROR))
    }

    pub fn is_tool_call(&self) -> bool {
        self.kind == SdkMessageType::Assistant && self.has_subtype(SUBTYPE_TOOL_USE)
    }

    pub fn is_tool_result(&self) -> bool {
        self.has_subtype(SUBTYPE_TOOL_RESULT)
    }

    /// Tool name of a tool-call message
    pub fn tool_name(&self) -> Option<&str> {
        if !self.is_tool_call() {
            return None;
        }
        match &self.content {
            MessageContent::Structured(value) => value["tool_name"].as_str(),
            MessageContent::Text(_) => None,
        }
    }

    /// Plain assistant text (no subtype)
    pub fn assistant_text(&self) -> Option<&str> {
        if self.kind == SdkMessageType::Assistant && self.subtype.is_none() {
            self.content.as_text()
        } else {
            None
        }
    }
}
