use crate::transcript::Transcript;
use crate::types::{Message, Role, ToolCall, ToolResult};

/// Read-only filtering helpers over a transcript, for rendering collaborators
/// that want a slice of the history without walking it themselves.
pub struct TranscriptQuery<'a> {
    transcript: &'a Transcript,
}

impl<'a> TranscriptQuery<'a> {
    pub fn new(transcript: &'a Transcript) -> Self {
        Self { transcript }
    }

    pub fn by_role(&self, role: Role) -> Vec<&'a Message> {
        self.transcript
            .messages()
            .iter()
            .filter(|m| m.role == role)
            .collect()
    }

    pub fn contains_text(&self, search: &str) -> Vec<&'a Message> {
        let search_lower = search.to_lowercase();
        self.transcript
            .messages()
            .iter()
            .filter(|m| {
                m.content.to_lowercase().contains(&search_lower)
                    || m.tool_results
                        .iter()
                        .any(|r| r.content.to_lowercase().contains(&search_lower))
            })
            .collect()
    }

    pub fn tool_uses(&self) -> Vec<(&'a Message, &'a ToolCall)> {
        self.transcript
            .messages()
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(move |c| (m, c)))
            .collect()
    }

    pub fn tool_uses_by_name(&self, tool_name: &str) -> Vec<(&'a Message, &'a ToolCall)> {
        self.tool_uses()
            .into_iter()
            .filter(|(_, c)| c.name == tool_name)
            .collect()
    }

    pub fn errors(&self) -> Vec<&'a ToolResult> {
        self.transcript
            .messages()
            .iter()
            .flat_map(|m| m.tool_results.iter())
            .filter(|r| r.is_error)
            .collect()
    }
}
