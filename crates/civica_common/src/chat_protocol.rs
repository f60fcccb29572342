//! Chat protocol types shared between the orchestration loop and the
//! OpenAI-compatible completion endpoint.
//!
//! Messages are role-tagged (system/user/assistant/tool). Assistant messages
//! may carry tool-call requests; tool messages carry the call id they answer.

use serde::{Deserialize, Serialize};

/// Role of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool invocation requested by the model.
///
/// `arguments` is the raw JSON string exactly as the model produced it;
/// parsing is deferred to dispatch so a malformed payload can become a
/// structured failure instead of a turn-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type", default = "function_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

fn function_call_type() -> String {
    "function".to_string()
}

/// A single transcript message in wire shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    /// Assistant message that requests tool calls
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
            name: None,
        }
    }

    /// Tool result correlated back to the call that produced it
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(tool_name.into()),
        }
    }

    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

/// Machine-readable tool definition handed to the model on every turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What the model returned for one completion request
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    /// Plain assistant content, if any
    pub content: Option<String>,
    /// Tool calls the model wants dispatched before it can answer
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatOutcome {
    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_carries_correlation() {
        let msg = ChatMessage::tool_result("call_7", "verify_information", "{\"success\":true}");
        assert_eq!(msg.role, ChatRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_7"));
        assert_eq!(msg.name.as_deref(), Some("verify_information"));
    }

    #[test]
    fn plain_messages_skip_absent_fields() {
        let json = serde_json::to_string(&ChatMessage::user("hello")).unwrap();
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("tool_calls"));
    }

    #[test]
    fn tool_call_request_round_trips() {
        let wire = r#"{"id":"call_1","type":"function","function":{"name":"check_threat_patterns","arguments":"{\"contact_info\":\"+2348000000000\"}"}}"#;
        let call: ToolCallRequest = serde_json::from_str(wire).unwrap();
        assert_eq!(call.function.name, "check_threat_patterns");
        let back = serde_json::to_string(&call).unwrap();
        let again: ToolCallRequest = serde_json::from_str(&back).unwrap();
        assert_eq!(again.id, "call_1");
    }
}
