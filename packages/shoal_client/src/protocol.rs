//! Wire protocol types for the agent event stream.
//!
//! Both directions are JSON text frames tagged by `type`. Optional fields
//! default when absent so older producers stay parseable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent FROM the client TO the remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a conversation thread.
    Session { session_id: String },

    /// A user turn. `message_id` pre-assigns the id the resulting assistant
    /// message will stream into.
    Message {
        content: String,
        session_id: String,
        message_id: String,
    },

    /// Ask the remote side to abort the in-flight turn.
    Cancel { session_id: String },
}

/// Messages sent FROM the remote agent TO the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Incremental assistant text for the in-progress message.
    TextDelta {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// A tool invocation has started.
    ToolCall {
        id: String,
        name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// A tool invocation completed.
    ToolResult {
        id: String,
        output: String,
        #[serde(default)]
        is_error: bool,
    },

    /// The current assistant turn has finished.
    MessageComplete,

    /// Terminal failure of the current turn. Cleanup matches
    /// `message_complete`; already-merged partial results are kept.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}
