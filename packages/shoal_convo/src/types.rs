use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Outcome of one tool invocation, attached to the call with the matching id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,

    #[serde(default)]
    pub is_error: bool,
}

/// One tool invocation made by the assistant during a turn.
///
/// Lives in the transcript's in-flight buffer until the turn finalizes, at
/// which point it belongs to exactly one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,

    /// When the call was first seen locally. Bookkeeping only, not protocol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            result: None,
            started_at: None,
        }
    }
}

/// A single transcript entry. Streaming assistant messages grow their
/// `content` in place until the turn finalizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content)
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }

    fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// True once any attached tool result carries the error flag.
    pub fn has_tool_error(&self) -> bool {
        self.tool_results.iter().any(|r| r.is_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("User".parse::<Role>().unwrap(), Role::User);
        assert_eq!("ASSISTANT".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn tool_call_starts_without_result() {
        let call = ToolCall::new("t1", "read", json!({"path": "README.md"}));
        assert!(call.result.is_none());
        assert!(call.started_at.is_none());
        assert_eq!(call.input["path"], "README.md");
    }

    #[test]
    fn message_serde_skips_empty_tool_fields() {
        let msg = Message::assistant("m1", "hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "assistant");
        assert!(value.get("toolCalls").is_none());
        assert!(value.get("toolResults").is_none());
    }

    #[test]
    fn message_tool_error_detection() {
        let mut msg = Message::assistant("m1", "");
        assert!(!msg.has_tool_error());
        msg.tool_results.push(ToolResult {
            tool_call_id: "t1".to_string(),
            content: "permission denied".to_string(),
            is_error: true,
        });
        assert!(msg.has_tool_error());
    }
}
