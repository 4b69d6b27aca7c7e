//! # Shoal Conversations
//!
//! Transcript data model and delta merge engine for live agent conversations.
//!
//! A [`Transcript`] is the ordered message history of one conversation
//! thread, reconstructed from an incremental event stream that may deliver
//! related events out of order: text deltas for an in-progress assistant
//! message, tool calls announced mid-turn, and tool results that can race
//! ahead of the call they belong to. The merge operations are synchronous
//! state transitions with no I/O, so the whole engine is testable without a
//! runtime.
//!
//! ## Quick Start
//!
//! ```rust
//! use shoal_convo::{ToolCall, ToolResult, Transcript};
//! use serde_json::json;
//!
//! let mut transcript = Transcript::new();
//! transcript.append_user_message("u1", "list the files");
//!
//! // Result arrives before its call; it parks until the call registers.
//! transcript.tool_result_arrived(ToolResult {
//!     tool_call_id: "t1".to_string(),
//!     content: "src/ Cargo.toml".to_string(),
//!     is_error: false,
//! });
//! transcript.apply_text_delta(Some("a1"), "Listing now.");
//! transcript.tool_call_started(ToolCall::new("t1", "bash", json!({"command": "ls"})), None);
//! transcript.finalize(None);
//!
//! let reply = &transcript.messages()[1];
//! assert_eq!(reply.tool_calls[0].result.as_ref().unwrap().content, "src/ Cargo.toml");
//! ```

pub mod query;
pub mod transcript;
pub mod types;

pub use query::TranscriptQuery;
pub use transcript::Transcript;
pub use types::{Message, Role, ToolCall, ToolResult};
