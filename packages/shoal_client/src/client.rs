//! Consumer-facing client surface.
//!
//! [`AgentClient`] ties the connection actor and the session multiplexer
//! together behind one cloneable handle. All transcript mutation happens
//! inside a single actor task: commands from handles and inbound connection
//! events are drained off mpsc channels one at a time, so no two mutations
//! ever interleave and the engine state needs no locks.

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use shoal_convo::{Message, ToolCall, ToolResult};

use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionHandle, ConnectionStats, spawn_connection};
use crate::error::{ClientError, Result};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::sessions::{SessionInfo, SessionMultiplexer};

/// Change notifications pushed to subscribers. Payloads stay small;
/// consumers pull current state through the handle accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientUpdate {
    MessagesChanged,
    StreamingChanged(bool),
    SessionsChanged,
    ConnectionChanged { connected: bool },
}

#[derive(Debug)]
enum ClientCommand {
    Connect {
        url: Option<String>,
    },
    Disconnect,
    SubmitUserMessage {
        content: String,
        respond_to: oneshot::Sender<String>,
    },
    RequestCancel,
    CreateSession {
        label: Option<String>,
        respond_to: oneshot::Sender<String>,
    },
    SwitchSession {
        session_id: String,
    },
    Messages {
        respond_to: oneshot::Sender<Vec<Message>>,
    },
    Sessions {
        respond_to: oneshot::Sender<Vec<SessionInfo>>,
    },
    IsStreaming {
        respond_to: oneshot::Sender<bool>,
    },
    ActiveSession {
        respond_to: oneshot::Sender<Option<String>>,
    },
    ConnectionStats {
        respond_to: oneshot::Sender<Result<ConnectionStats>>,
    },
}

/// Handle to the client actor. Cheap to clone; all clones address the same
/// live state.
#[derive(Clone)]
pub struct AgentClient {
    sender: mpsc::Sender<ClientCommand>,
    updates: broadcast::Sender<ClientUpdate>,
}

impl AgentClient {
    /// Spawn the client and connection actors. Must be called within a tokio
    /// runtime. No connection is opened until [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> Self {
        let (updates, _) = broadcast::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        let connection = spawn_connection(config.connection.clone(), event_tx);
        let (sender, receiver) = mpsc::channel(64);

        let actor = ClientActor {
            receiver,
            connection_events: event_rx,
            connection,
            sessions: SessionMultiplexer::new(),
            updates: updates.clone(),
            default_url: config.connection.url,
        };
        tokio::spawn(actor.run());

        Self { sender, updates }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientUpdate> {
        self.updates.subscribe()
    }

    /// Connect to the endpoint from the configuration.
    pub async fn connect(&self) -> Result<()> {
        self.send_command(ClientCommand::Connect { url: None }).await
    }

    /// Connect to an explicit endpoint, overriding the configuration.
    pub async fn connect_to(&self, url: impl Into<String>) -> Result<()> {
        self.send_command(ClientCommand::Connect {
            url: Some(url.into()),
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send_command(ClientCommand::Disconnect).await
    }

    /// Append a user turn to the active session (creating a default session
    /// if none exists) and send it. Returns the pre-assigned id the
    /// assistant reply will stream into.
    pub async fn submit_user_message(&self, content: impl Into<String>) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::SubmitUserMessage {
            content: content.into(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ClientError::ActorGone)
    }

    /// Ask the remote side to abort the in-flight turn and clear the local
    /// streaming indicator. Best-effort: events already in flight for the
    /// cancelled turn are still merged when they arrive.
    pub async fn request_cancel(&self) -> Result<()> {
        self.send_command(ClientCommand::RequestCancel).await
    }

    pub async fn create_session(&self, label: Option<String>) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::CreateSession {
            label,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ClientError::ActorGone)
    }

    pub async fn switch_session(&self, session_id: impl Into<String>) -> Result<()> {
        self.send_command(ClientCommand::SwitchSession {
            session_id: session_id.into(),
        })
        .await
    }

    /// Ordered messages of the active session.
    pub async fn messages(&self) -> Result<Vec<Message>> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::Messages { respond_to: tx })
            .await?;
        rx.await.map_err(|_| ClientError::ActorGone)
    }

    pub async fn sessions(&self) -> Result<Vec<SessionInfo>> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::Sessions { respond_to: tx })
            .await?;
        rx.await.map_err(|_| ClientError::ActorGone)
    }

    pub async fn is_streaming(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::IsStreaming { respond_to: tx })
            .await?;
        rx.await.map_err(|_| ClientError::ActorGone)
    }

    pub async fn active_session(&self) -> Result<Option<String>> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::ActiveSession { respond_to: tx })
            .await?;
        rx.await.map_err(|_| ClientError::ActorGone)
    }

    pub async fn connection_stats(&self) -> Result<ConnectionStats> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::ConnectionStats { respond_to: tx })
            .await?;
        rx.await.map_err(|_| ClientError::ActorGone)?
    }

    async fn send_command(&self, command: ClientCommand) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ClientError::ActorGone)
    }
}

struct ClientActor {
    receiver: mpsc::Receiver<ClientCommand>,
    connection_events: mpsc::Receiver<ConnectionEvent>,
    connection: ConnectionHandle,
    sessions: SessionMultiplexer,
    updates: broadcast::Sender<ClientUpdate>,
    default_url: Option<String>,
}

impl ClientActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                Some(event) = self.connection_events.recv() => {
                    self.handle_connection_event(event);
                }
            }
        }
        debug!("Client actor stopped");
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Connect { url } => {
                let Some(url) = url.or_else(|| self.default_url.clone()) else {
                    warn!("Connect requested but no endpoint is configured");
                    return;
                };
                self.ensure_active_session().await;
                if let Err(e) = self.connection.connect(url).await {
                    warn!("Connect command failed: {}", e);
                }
            }

            ClientCommand::Disconnect => {
                if let Err(e) = self.connection.disconnect().await {
                    warn!("Disconnect command failed: {}", e);
                }
            }

            ClientCommand::SubmitUserMessage {
                content,
                respond_to,
            } => {
                let session_id = self.ensure_active_session().await;
                let message_id = Uuid::new_v4().to_string();

                self.sessions
                    .transcript_mut()
                    .append_user_message(Uuid::new_v4().to_string(), content.clone());
                self.publish(ClientUpdate::MessagesChanged);
                self.set_streaming(true);

                if let Err(e) = self
                    .connection
                    .send(ClientMessage::Message {
                        content,
                        session_id,
                        message_id: message_id.clone(),
                    })
                    .await
                {
                    warn!("Failed to hand message to connection: {}", e);
                }
                let _ = respond_to.send(message_id);
            }

            ClientCommand::RequestCancel => {
                let Some(session_id) = self.sessions.active_id().map(str::to_string) else {
                    return;
                };
                if let Err(e) = self
                    .connection
                    .send(ClientMessage::Cancel { session_id })
                    .await
                {
                    warn!("Failed to send cancel: {}", e);
                }
                self.set_streaming(false);
            }

            ClientCommand::CreateSession { label, respond_to } => {
                let id = self.sessions.create_session(label);
                self.rebind(&id).await;
                self.publish(ClientUpdate::SessionsChanged);
                self.publish(ClientUpdate::MessagesChanged);
                let _ = respond_to.send(id);
            }

            ClientCommand::SwitchSession { session_id } => {
                self.sessions.switch_session(&session_id);
                self.rebind(&session_id).await;
                self.publish(ClientUpdate::SessionsChanged);
                self.publish(ClientUpdate::MessagesChanged);
                self.publish(ClientUpdate::StreamingChanged(false));
            }

            ClientCommand::Messages { respond_to } => {
                let _ = respond_to.send(self.sessions.transcript().messages().to_vec());
            }

            ClientCommand::Sessions { respond_to } => {
                let _ = respond_to.send(self.sessions.sessions().to_vec());
            }

            ClientCommand::IsStreaming { respond_to } => {
                let _ = respond_to.send(self.sessions.transcript().is_streaming());
            }

            ClientCommand::ActiveSession { respond_to } => {
                let _ = respond_to.send(self.sessions.active_id().map(str::to_string));
            }

            ClientCommand::ConnectionStats { respond_to } => {
                let _ = respond_to.send(self.connection.stats().await);
            }
        }
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                debug!("Connection opened");
                self.publish(ClientUpdate::ConnectionChanged { connected: true });
            }
            ConnectionEvent::Inbound(message) => self.apply_server_message(message),
            ConnectionEvent::Closed => {
                self.set_streaming(false);
                self.publish(ClientUpdate::ConnectionChanged { connected: false });
            }
            ConnectionEvent::RetriesExhausted => {
                self.set_streaming(false);
                self.sessions.transcript_mut().clear_tool_calls();
            }
        }
    }

    /// Merge one inbound event into the active session's transcript.
    fn apply_server_message(&mut self, message: ServerMessage) {
        let transcript = self.sessions.transcript_mut();
        match message {
            ServerMessage::TextDelta {
                content,
                message_id,
            } => {
                transcript.apply_text_delta(message_id.as_deref(), &content);
                self.publish(ClientUpdate::MessagesChanged);
                self.set_streaming(true);
            }
            ServerMessage::ToolCall {
                id,
                name,
                input,
                message_id,
            } => {
                transcript.tool_call_started(ToolCall::new(id, name, input), message_id.as_deref());
                self.publish(ClientUpdate::MessagesChanged);
                self.set_streaming(true);
            }
            ServerMessage::ToolResult {
                id,
                output,
                is_error,
            } => {
                transcript.tool_result_arrived(ToolResult {
                    tool_call_id: id,
                    content: output,
                    is_error,
                });
                self.publish(ClientUpdate::MessagesChanged);
            }
            ServerMessage::MessageComplete => {
                transcript.finalize(None);
                self.publish(ClientUpdate::MessagesChanged);
                self.set_streaming(false);
            }
            ServerMessage::Error { message } => {
                warn!(
                    "Remote turn failed: {}",
                    message.as_deref().unwrap_or("unspecified error")
                );
                transcript.finalize(None);
                self.publish(ClientUpdate::MessagesChanged);
                self.set_streaming(false);
            }
        }
    }

    /// Create and bind a default session if none is active yet.
    async fn ensure_active_session(&mut self) -> String {
        if let Some(id) = self.sessions.active_id() {
            return id.to_string();
        }
        let id = self.sessions.create_session(None);
        self.rebind(&id).await;
        self.publish(ClientUpdate::SessionsChanged);
        id
    }

    async fn rebind(&mut self, session_id: &str) {
        if let Err(e) = self.connection.bind_session(session_id).await {
            warn!("Failed to bind session {}: {}", session_id, e);
        }
    }

    fn set_streaming(&mut self, streaming: bool) {
        let transcript = self.sessions.transcript_mut();
        if transcript.is_streaming() != streaming {
            transcript.set_streaming(streaming);
            self.publish(ClientUpdate::StreamingChanged(streaming));
        }
    }

    fn publish(&self, update: ClientUpdate) {
        // No receivers is fine; updates are advisory.
        let _ = self.updates.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_convo::Role;

    fn offline_client() -> AgentClient {
        // No endpoint configured: sends queue, nothing auto-connects.
        AgentClient::new(ClientConfig::default())
    }

    #[tokio::test]
    async fn submit_creates_default_session_and_appends_user_message() {
        let client = offline_client();
        let stream_id = client.submit_user_message("hello").await.unwrap();
        assert!(!stream_id.is_empty());

        let sessions = client.sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].label, "Session 1");

        let messages = client.messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello");
        assert!(client.is_streaming().await.unwrap());
    }

    #[tokio::test]
    async fn cancel_clears_streaming_locally() {
        let client = offline_client();
        client.submit_user_message("hello").await.unwrap();
        assert!(client.is_streaming().await.unwrap());

        client.request_cancel().await.unwrap();
        assert!(!client.is_streaming().await.unwrap());
    }

    #[tokio::test]
    async fn sessions_switch_without_leaking_messages() {
        let client = offline_client();
        client.submit_user_message("in A").await.unwrap();
        let a = client.active_session().await.unwrap().unwrap();

        let b = client.create_session(Some("B".to_string())).await.unwrap();
        assert!(client.messages().await.unwrap().is_empty());
        client.submit_user_message("in B").await.unwrap();

        client.switch_session(&a).await.unwrap();
        let messages = client.messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "in A");

        client.switch_session(&b).await.unwrap();
        assert_eq!(client.messages().await.unwrap()[0].content, "in B");
    }

    #[tokio::test]
    async fn streaming_resets_after_switch_even_if_set() {
        let client = offline_client();
        client.submit_user_message("hello").await.unwrap();
        let a = client.active_session().await.unwrap().unwrap();
        client.create_session(None).await.unwrap();

        client.switch_session(&a).await.unwrap();
        assert!(!client.is_streaming().await.unwrap());
    }

    #[tokio::test]
    async fn subscribers_see_message_and_streaming_updates() {
        let client = offline_client();
        let mut updates = client.subscribe();

        client.submit_user_message("hello").await.unwrap();

        let mut seen = Vec::new();
        while let Ok(update) = updates.try_recv() {
            seen.push(update);
        }
        assert!(seen.contains(&ClientUpdate::SessionsChanged));
        assert!(seen.contains(&ClientUpdate::MessagesChanged));
        assert!(seen.contains(&ClientUpdate::StreamingChanged(true)));
    }

    #[tokio::test]
    async fn outbound_messages_queue_while_disconnected() {
        let client = offline_client();
        client.submit_user_message("first").await.unwrap();
        client.submit_user_message("second").await.unwrap();

        let stats = client.connection_stats().await.unwrap();
        assert!(!stats.connected);
        assert_eq!(stats.queued, 2);
        assert!(!stats.exhausted);
    }
}
