use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::types::{Message, Role, ToolCall, ToolResult};

/// Live state of one conversation thread.
///
/// Inbound protocol events are applied one at a time through the methods
/// below; each is a synchronous state transition. Tool calls accumulate in an
/// in-flight buffer keyed to a single stream-target message until the turn
/// finalizes, and results that race ahead of their call announcement park in
/// `pending_tool_results` until the call registers.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    current_tool_calls: Vec<ToolCall>,
    pending_tool_results: HashMap<String, ToolResult>,
    stream_message_id: Option<String>,
    is_streaming: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Tool calls accumulated for the in-flight turn, not yet finalized.
    pub fn in_flight_tool_calls(&self) -> &[ToolCall] {
        &self.current_tool_calls
    }

    pub fn stream_message_id(&self) -> Option<&str> {
        self.stream_message_id.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// The streaming flag is connection-scoped, not part of the merge
    /// contracts: callers flip it on submit/complete/cancel/disconnect.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.is_streaming = streaming;
    }

    /// Appends the outbound user turn to the transcript.
    pub fn append_user_message(&mut self, id: impl Into<String>, content: impl Into<String>) {
        self.messages.push(Message::user(id, content));
    }

    /// Merges an incremental text fragment and returns the resolved target id.
    ///
    /// An explicit `message_id` that matches no assistant message creates a
    /// new assistant message with that exact id: an id mismatch must never
    /// fall back to mutating whatever message happens to be last.
    pub fn apply_text_delta(&mut self, message_id: Option<&str>, content: &str) -> String {
        let resolved = match message_id {
            Some(id) => {
                match self
                    .messages
                    .iter_mut()
                    .find(|m| m.id == id && m.role == Role::Assistant)
                {
                    Some(message) => message.content.push_str(content),
                    None => self.messages.push(Message::assistant(id, content)),
                }
                id.to_string()
            }
            None => match self.messages.last_mut() {
                Some(last) if last.role == Role::Assistant => {
                    last.content.push_str(content);
                    last.id.clone()
                }
                _ => {
                    let message = Message::assistant(Uuid::new_v4().to_string(), content);
                    let id = message.id.clone();
                    self.messages.push(message);
                    id
                }
            },
        };
        self.stream_message_id = Some(resolved.clone());
        resolved
    }

    /// Registers a started tool call against the resolved target message.
    ///
    /// Target resolution order: explicit `message_id`, then the current
    /// stream target, then the most recent assistant message, then a fresh
    /// empty assistant placeholder (tool-only turns with no preceding text).
    /// A target change resets the in-flight buffer so calls meant for a new
    /// message never append to a stale message's list.
    pub fn tool_call_started(&mut self, mut call: ToolCall, message_id: Option<&str>) {
        let resolved = message_id
            .map(str::to_string)
            .or_else(|| self.stream_message_id.clone())
            .or_else(|| {
                self.messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant)
                    .map(|m| m.id.clone())
            })
            .unwrap_or_else(|| {
                let placeholder = Message::assistant(Uuid::new_v4().to_string(), "");
                let id = placeholder.id.clone();
                self.messages.push(placeholder);
                id
            });

        if self.stream_message_id.as_deref() != Some(resolved.as_str()) {
            self.current_tool_calls.clear();
        }

        call.started_at = Some(Utc::now());
        if let Some(result) = self.pending_tool_results.remove(&call.id) {
            call.result = Some(result);
        }
        self.current_tool_calls.push(call);
        self.stream_message_id = Some(resolved);
    }

    /// Attaches a result to its in-flight call, or parks it until the call
    /// registers. Results delivered ahead of their call are never lost.
    pub fn tool_result_arrived(&mut self, result: ToolResult) {
        match self
            .current_tool_calls
            .iter_mut()
            .find(|c| c.id == result.tool_call_id)
        {
            Some(call) => call.result = Some(result),
            None => {
                self.pending_tool_results
                    .insert(result.tool_call_id.clone(), result);
            }
        }
    }

    /// Permanently attaches the in-flight buffer to its target message and
    /// clears transient stream state.
    ///
    /// With an empty buffer this only clears the stream target. If no
    /// assistant message matches the resolved id (a tool-only response that
    /// never streamed text), one is synthesized with empty content.
    pub fn finalize(&mut self, message_id: Option<&str>) {
        if self.current_tool_calls.is_empty() {
            self.stream_message_id = None;
            return;
        }

        let target = message_id
            .map(str::to_string)
            .or_else(|| self.stream_message_id.clone());
        let calls = std::mem::take(&mut self.current_tool_calls);
        let results: Vec<ToolResult> = calls.iter().filter_map(|c| c.result.clone()).collect();

        let position = target.as_deref().and_then(|id| {
            self.messages
                .iter()
                .rposition(|m| m.id == id && m.role == Role::Assistant)
        });
        match position {
            Some(index) => {
                let message = &mut self.messages[index];
                message.tool_calls = calls;
                message.tool_results = results;
            }
            None => {
                let id = target.unwrap_or_else(|| Uuid::new_v4().to_string());
                let mut message = Message::assistant(id, "");
                message.tool_calls = calls;
                message.tool_results = results;
                self.messages.push(message);
            }
        }

        self.stream_message_id = None;
    }

    /// Discards all transient tool-call state without touching finalized
    /// messages. Used on exhausted reconnects and explicit cancellation.
    pub fn clear_tool_calls(&mut self) {
        self.current_tool_calls.clear();
        self.pending_tool_results.clear();
        self.stream_message_id = None;
    }
}
