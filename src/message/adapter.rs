//! Conversions from provider-shaped data into [`SdkMessage`]s.
//!
//! Every function is total: missing or oddly shaped fields degrade to empty
//! values instead of failing.

use std::fmt::Display;

use serde_json::{Value, json};

use crate::llm::Message;

use super::{
    MessageContent, SUBTYPE_ERROR, SUBTYPE_SUCCESS, SUBTYPE_TOOL_RESULT, SUBTYPE_TOOL_USE,
    SdkMessage, SdkMessageType,
};

pub fn create_user_message(content: impl Into<String>, session_id: &str) -> SdkMessage {
    SdkMessage::new(
        SdkMessageType::User,
        MessageContent::Text(content.into()),
        session_id,
    )
}

pub fn create_assistant_message(
    content: impl Into<String>,
    session_id: &str,
    duration_ms: Option<u64>,
) -> SdkMessage {
    let mut msg = SdkMessage::new(
        SdkMessageType::Assistant,
        MessageContent::Text(content.into()),
        session_id,
    );
    msg.duration_ms = duration_ms;
    msg
}

pub fn create_system_message(content: impl Into<String>, session_id: &str) -> SdkMessage {
    SdkMessage::new(
        SdkMessageType::System,
        MessageContent::Text(content.into()),
        session_id,
    )
}

/// Terminal failure message. Accepts anything displayable: errors or strings.
pub fn create_error_message(error: impl Display, session_id: &str) -> SdkMessage {
    let mut msg = SdkMessage::new(
        SdkMessageType::Result,
        MessageContent::Text(error.to_string()),
        session_id,
    );
    msg.subtype = Some(SUBTYPE_ERROR.to_string());
    msg.is_error = true;
    msg
}

/// Terminal success message with the task's totals
pub fn create_result_message(
    summary: impl Into<String>,
    session_id: &str,
    duration_ms: u64,
    total_cost_usd: Option<f64>,
) -> SdkMessage {
    let mut msg = SdkMessage::new(
        SdkMessageType::Result,
        MessageContent::Text(summary.into()),
        session_id,
    );
    msg.subtype = Some(SUBTYPE_SUCCESS.to_string());
    msg.duration_ms = Some(duration_ms);
    msg.total_cost_usd = total_cost_usd;
    msg
}

/// Tool call message from a provider-shaped call.
///
/// The tool name is looked up as `toolName`, then `function.name`, then
/// `name`; the id as `toolCallId` then `id`; arguments as `args`,
/// `arguments`, `function.arguments` or `input`. Arguments encoded as a JSON
/// string are decoded when possible.
pub fn create_tool_call_message(call: &Value, session_id: &str) -> SdkMessage {
    let name = first_str(call, &["/toolName", "/function/name", "/name"]).unwrap_or("unknown");
    let id = first_str(call, &["/toolCallId", "/id"]).unwrap_or_default();
    let args = ["/args", "/arguments", "/function/arguments", "/input"]
        .iter()
        .find_map(|p| call.pointer(p))
        .map(decode_arguments)
        .unwrap_or_else(|| json!({}));

    let mut msg = SdkMessage::new(
        SdkMessageType::Assistant,
        MessageContent::Structured(json!({
            "tool_name": name,
            "tool_use_id": id,
            "args": args,
        })),
        session_id,
    );
    msg.subtype = Some(SUBTYPE_TOOL_USE.to_string());
    msg
}

/// Tool result message from a provider-shaped result
pub fn create_tool_result_message(result: &Value, session_id: &str) -> SdkMessage {
    let id = first_str(result, &["/toolCallId", "/tool_call_id", "/id"]).unwrap_or_default();
    let name = first_str(result, &["/toolName", "/tool_name", "/name"]).unwrap_or_default();
    let output = ["/result", "/output", "/content"]
        .iter()
        .find_map(|p| result.pointer(p))
        .cloned()
        .unwrap_or(Value::Null);
    let is_error = ["/isError", "/is_error"]
        .iter()
        .find_map(|p| result.pointer(p).and_then(Value::as_bool))
        .unwrap_or(false);

    let mut msg = SdkMessage::new(
        SdkMessageType::User,
        MessageContent::Structured(json!({
            "tool_use_id": id,
            "tool_name": name,
            "result": output,
            "is_error": is_error,
        })),
        session_id,
    );
    msg.subtype = Some(SUBTYPE_TOOL_RESULT.to_string());
    if !id.is_empty() {
        msg.parent_tool_use_id = Some(id.to_string());
    }
    msg
}

/// Sum of the costs on `result` messages; `None` when no result carries one
pub fn calculate_total_cost(messages: &[SdkMessage]) -> Option<f64> {
    messages
        .iter()
        .filter(|m| m.kind == SdkMessageType::Result)
        .filter_map(|m| m.total_cost_usd)
        .fold(None, |acc, cost| Some(acc.unwrap_or(0.0) + cost))
}

/// Rebuild model history from uniform messages: plain user and assistant text only
pub fn conversation_history(messages: &[SdkMessage]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| m.subtype.is_none())
        .filter_map(|m| match (m.kind, m.content.as_text()) {
            (SdkMessageType::User, Some(text)) => Some(Message::user(text)),
            (SdkMessageType::Assistant, Some(text)) => Some(Message::assistant(text)),
            _ => None,
        })
        .collect()
}

fn first_str<'a>(value: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn decode_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| raw.clone()),
        other => other.clone(),
    }
}
