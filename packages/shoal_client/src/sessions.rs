//! Session multiplexing.
//!
//! Many conversation threads share one connection; exactly one is active at
//! a time. The multiplexer snapshots the outgoing thread's live state on
//! every switch or create and restores it when the thread becomes active
//! again, so no transcript history is ever lost in-process.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shoal_convo::Transcript;
use uuid::Uuid;

/// Descriptor for one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Holds every session created in this run plus the live state of the
/// active one.
#[derive(Debug, Default)]
pub struct SessionMultiplexer {
    /// Creation order; sessions are never destroyed during the process
    /// lifetime.
    sessions: Vec<SessionInfo>,
    /// Saved state per session id, restored on re-activation.
    snapshots: HashMap<String, Transcript>,
    active_id: Option<String>,
    live: Transcript,
    created: usize,
}

impl SessionMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn sessions(&self) -> &[SessionInfo] {
        &self.sessions
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.sessions.iter().any(|s| s.id == id)
    }

    /// Live transcript of the active session.
    pub fn transcript(&self) -> &Transcript {
        &self.live
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.live
    }

    /// Create a fresh session and make it active. The outgoing session's
    /// state is snapshotted first. Default labels number sessions in
    /// creation order.
    pub fn create_session(&mut self, label: Option<String>) -> String {
        self.snapshot_active();
        let id = Uuid::new_v4().to_string();
        self.created += 1;
        let label = label.unwrap_or_else(|| format!("Session {}", self.created));
        self.sessions.push(SessionInfo {
            id: id.clone(),
            label,
            created_at: Utc::now(),
        });
        self.live = Transcript::new();
        self.active_id = Some(id.clone());
        id
    }

    /// Activate `id`, restoring its snapshot (or an empty transcript for an
    /// id this process has never seen). The streaming flag is
    /// connection-scoped and always restores as false.
    pub fn switch_session(&mut self, id: &str) {
        self.snapshot_active();
        self.register_if_unknown(id);
        self.live = self.snapshots.get(id).cloned().unwrap_or_default();
        self.live.set_streaming(false);
        self.active_id = Some(id.to_string());
    }

    /// Low-level bind without snapshot/restore semantics. Only for
    /// bootstrap/handshake flows where there is no prior state to preserve.
    pub fn set_session_id(&mut self, id: &str) {
        self.register_if_unknown(id);
        self.active_id = Some(id.to_string());
    }

    fn snapshot_active(&mut self) {
        if let Some(active) = self.active_id.clone() {
            self.snapshots.insert(active, self.live.clone());
        }
    }

    fn register_if_unknown(&mut self, id: &str) {
        if !self.has_session(id) {
            self.created += 1;
            self.sessions.push(SessionInfo {
                id: id.to_string(),
                label: format!("Session {}", self.created),
                created_at: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_numbered_labels_in_creation_order() {
        let mut mux = SessionMultiplexer::new();
        mux.create_session(None);
        mux.create_session(Some("Auth refactor".to_string()));
        mux.create_session(None);

        let labels: Vec<&str> = mux.sessions().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Session 1", "Auth refactor", "Session 3"]);
    }

    #[test]
    fn created_ids_never_collide() {
        let mut mux = SessionMultiplexer::new();
        let a = mux.create_session(None);
        let b = mux.create_session(None);
        assert_ne!(a, b);
    }

    #[test]
    fn messages_stay_isolated_between_sessions() {
        let mut mux = SessionMultiplexer::new();
        let a = mux.create_session(None);
        mux.transcript_mut().append_user_message("u1", "only in A");

        let b = mux.create_session(None);
        assert_eq!(mux.transcript().message_count(), 0);
        mux.transcript_mut().append_user_message("u2", "only in B");

        mux.switch_session(&a);
        assert_eq!(mux.transcript().message_count(), 1);
        assert_eq!(mux.transcript().messages()[0].content, "only in A");

        mux.switch_session(&b);
        assert_eq!(mux.transcript().messages()[0].content, "only in B");
    }

    #[test]
    fn switch_restores_in_flight_tool_state() {
        let mut mux = SessionMultiplexer::new();
        let a = mux.create_session(None);
        mux.transcript_mut().apply_text_delta(Some("a1"), "text");
        mux.transcript_mut()
            .tool_call_started(shoal_convo::ToolCall::new("t1", "read", serde_json::json!({})), None);

        let b = mux.create_session(None);
        assert!(mux.transcript().in_flight_tool_calls().is_empty());

        mux.switch_session(&a);
        assert_eq!(mux.transcript().in_flight_tool_calls().len(), 1);
        assert_eq!(mux.transcript().stream_message_id(), Some("a1"));
        let _ = b;
    }

    #[test]
    fn streaming_never_survives_a_switch_or_create() {
        let mut mux = SessionMultiplexer::new();
        let a = mux.create_session(None);
        mux.transcript_mut().set_streaming(true);

        let b = mux.create_session(None);
        assert!(!mux.transcript().is_streaming());

        mux.switch_session(&a);
        assert!(!mux.transcript().is_streaming());

        // Even re-activating the same session resets the flag.
        mux.transcript_mut().set_streaming(true);
        mux.switch_session(&a);
        assert!(!mux.transcript().is_streaming());
        let _ = b;
    }

    #[test]
    fn switching_to_unknown_id_yields_empty_transcript() {
        let mut mux = SessionMultiplexer::new();
        mux.create_session(None);
        mux.transcript_mut().append_user_message("u1", "existing");

        mux.switch_session("resumed-elsewhere");
        assert_eq!(mux.transcript().message_count(), 0);
        assert!(mux.has_session("resumed-elsewhere"));
        assert_eq!(mux.active_id(), Some("resumed-elsewhere"));
    }

    #[test]
    fn set_session_id_binds_without_restoring() {
        let mut mux = SessionMultiplexer::new();
        mux.set_session_id("boot");
        assert_eq!(mux.active_id(), Some("boot"));
        assert!(mux.has_session("boot"));
        assert_eq!(mux.transcript().message_count(), 0);
    }

    #[test]
    fn every_created_session_keeps_a_snapshot() {
        let mut mux = SessionMultiplexer::new();
        let a = mux.create_session(None);
        mux.transcript_mut().append_user_message("u1", "a");
        let b = mux.create_session(None);
        mux.transcript_mut().append_user_message("u2", "b");
        let c = mux.create_session(None);

        for id in [&a, &b, &c] {
            mux.switch_session(id);
        }
        mux.switch_session(&a);
        assert_eq!(mux.transcript().messages()[0].content, "a");
        mux.switch_session(&b);
        assert_eq!(mux.transcript().messages()[0].content, "b");
    }
}
