//! Connection lifecycle actor.
//!
//! Owns the single persistent WebSocket to the remote agent: connect,
//! automatic reconnection with linear backoff, and FIFO queueing of outbound
//! messages while disconnected. Inbound frames are parsed and forwarded to
//! the owner as [`ConnectionEvent`]s; malformed payloads are logged and
//! dropped so one bad event cannot kill the stream.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Sleep};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{ClientMessage, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands that can be sent to the connection actor.
#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        url: String,
    },
    Send {
        message: ClientMessage,
    },
    /// Update the session binding; re-sends the `session` handshake if the
    /// socket is open.
    BindSession {
        session_id: String,
    },
    Disconnect,
    Stats {
        respond_to: oneshot::Sender<ConnectionStats>,
    },
}

/// Events emitted by the connection actor to its owner.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Socket opened, handshake sent, queue flushed.
    Opened,
    /// A parsed inbound server event.
    Inbound(ServerMessage),
    /// The socket dropped unexpectedly; a reconnect may follow.
    Closed,
    /// All reconnect attempts failed. Terminal until an explicit connect.
    RetriesExhausted,
}

/// Point-in-time view of the connection state.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub connected: bool,
    pub attempts: u32,
    pub queued: usize,
    pub exhausted: bool,
}

/// Handle to communicate with the connection actor.
#[derive(Clone)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<ConnectionCommand>,
}

impl ConnectionHandle {
    pub async fn connect(&self, url: impl Into<String>) -> Result<()> {
        self.send_command(ConnectionCommand::Connect { url: url.into() })
            .await
    }

    pub async fn send(&self, message: ClientMessage) -> Result<()> {
        self.send_command(ConnectionCommand::Send { message }).await
    }

    pub async fn bind_session(&self, session_id: impl Into<String>) -> Result<()> {
        self.send_command(ConnectionCommand::BindSession {
            session_id: session_id.into(),
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send_command(ConnectionCommand::Disconnect).await
    }

    pub async fn stats(&self) -> Result<ConnectionStats> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ConnectionCommand::Stats { respond_to: tx })
            .await?;
        rx.await.map_err(|_| ClientError::ActorGone)
    }

    async fn send_command(&self, command: ConnectionCommand) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ClientError::ActorGone)
    }
}

/// Spawn the connection actor and return its handle.
///
/// Inbound events flow to `events`; the actor shuts down when every handle
/// is dropped.
pub fn spawn_connection(
    config: ConnectionConfig,
    events: mpsc::Sender<ConnectionEvent>,
) -> ConnectionHandle {
    let (sender, receiver) = mpsc::channel(64);
    let actor = ConnectionActor {
        receiver,
        events,
        url: config.url.clone(),
        config,
        session_id: None,
        queue: VecDeque::new(),
        attempts: 0,
        exhausted: false,
    };
    tokio::spawn(actor.run());
    ConnectionHandle { sender }
}

struct ConnectionActor {
    receiver: mpsc::Receiver<ConnectionCommand>,
    events: mpsc::Sender<ConnectionEvent>,
    config: ConnectionConfig,
    /// Endpoint of the most recent connect; reconnects reuse it.
    url: Option<String>,
    /// Session carried by the bind handshake on every (re)open.
    session_id: Option<String>,
    /// Outbound FIFO held while disconnected, flushed in order on open.
    queue: VecDeque<ClientMessage>,
    attempts: u32,
    exhausted: bool,
}

impl ConnectionActor {
    async fn run(mut self) {
        let reconnect = tokio::time::sleep(std::time::Duration::ZERO);
        tokio::pin!(reconnect);
        let mut reconnect_armed = false;
        let mut ws: Option<WsStream> = None;

        loop {
            tokio::select! {
                command = self.receiver.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        ConnectionCommand::Connect { url } => {
                            if let Some(mut stream) = ws.take() {
                                let _ = stream.close(None).await;
                            }
                            self.url = Some(url);
                            self.attempts = 0;
                            self.exhausted = false;
                            reconnect_armed = false;
                            if !self.open(&mut ws).await {
                                self.schedule_retry(&mut reconnect_armed, reconnect.as_mut())
                                    .await;
                            }
                        }
                        ConnectionCommand::Send { message } => {
                            self.transmit_or_queue(
                                message,
                                &mut ws,
                                &mut reconnect_armed,
                                reconnect.as_mut(),
                            )
                            .await;
                        }
                        ConnectionCommand::BindSession { session_id } => {
                            self.session_id = Some(session_id.clone());
                            if let Some(stream) = ws.as_mut() {
                                let bind = ClientMessage::Session { session_id };
                                if Self::transmit(stream, &bind).await.is_err() {
                                    self.handle_close(
                                        &mut ws,
                                        &mut reconnect_armed,
                                        reconnect.as_mut(),
                                    )
                                    .await;
                                }
                            }
                        }
                        ConnectionCommand::Disconnect => {
                            if let Some(mut stream) = ws.take() {
                                let _ = stream.close(None).await;
                            }
                            self.queue.clear();
                            reconnect_armed = false;
                            debug!("Disconnected; outbound queue dropped");
                        }
                        ConnectionCommand::Stats { respond_to } => {
                            let _ = respond_to.send(ConnectionStats {
                                connected: ws.is_some(),
                                attempts: self.attempts,
                                queued: self.queue.len(),
                                exhausted: self.exhausted,
                            });
                        }
                    }
                }

                frame = async {
                    match ws.as_mut() {
                        Some(stream) => stream.next().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(message) => {
                                    if self
                                        .events
                                        .send(ConnectionEvent::Inbound(message))
                                        .await
                                        .is_err()
                                    {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Dropping malformed server event: {}", e),
                            }
                        }
                        Some(Ok(tungstenite::Message::Close(_))) | None => {
                            debug!("Server closed the connection");
                            self.handle_close(&mut ws, &mut reconnect_armed, reconnect.as_mut())
                                .await;
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket read error: {}", e);
                            self.handle_close(&mut ws, &mut reconnect_armed, reconnect.as_mut())
                                .await;
                        }
                        Some(Ok(_)) => {}
                    }
                }

                () = &mut reconnect, if reconnect_armed => {
                    reconnect_armed = false;
                    if !self.open(&mut ws).await {
                        self.schedule_retry(&mut reconnect_armed, reconnect.as_mut())
                            .await;
                    }
                }
            }
        }

        debug!("Connection actor stopped");
    }

    /// Open the socket, send the bind handshake, flush the queue in FIFO
    /// order, then report `Opened`. Returns false on any failure.
    async fn open(&mut self, ws: &mut Option<WsStream>) -> bool {
        let Some(url) = self.url.clone() else {
            return false;
        };
        debug!("Connecting to {}", url);
        let mut stream = match connect_async(&url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                debug!("Connect to {} failed: {}", url, e);
                return false;
            }
        };

        self.attempts = 0;
        self.exhausted = false;

        if let Some(session_id) = self.session_id.clone() {
            let bind = ClientMessage::Session { session_id };
            if Self::transmit(&mut stream, &bind).await.is_err() {
                return false;
            }
        }

        while let Some(message) = self.queue.pop_front() {
            if Self::transmit(&mut stream, &message).await.is_err() {
                self.queue.push_front(message);
                return false;
            }
        }

        *ws = Some(stream);
        let _ = self.events.send(ConnectionEvent::Opened).await;
        true
    }

    async fn transmit(stream: &mut WsStream, message: &ClientMessage) -> anyhow::Result<()> {
        let json = serde_json::to_string(message)?;
        stream.send(tungstenite::Message::Text(json.into())).await?;
        Ok(())
    }

    async fn transmit_or_queue(
        &mut self,
        message: ClientMessage,
        ws: &mut Option<WsStream>,
        armed: &mut bool,
        mut sleep: Pin<&mut Sleep>,
    ) {
        if self.exhausted {
            warn!("Dropping outbound message; reconnect retries are exhausted");
            return;
        }

        if let Some(stream) = ws.as_mut() {
            if let Err(e) = Self::transmit(stream, &message).await {
                warn!("Send failed, requeueing: {}", e);
                self.queue.push_back(message);
                self.handle_close(ws, armed, sleep).await;
            }
            return;
        }

        self.queue.push_back(message);
        if !*armed && self.url.is_some() {
            sleep.as_mut().reset(Instant::now());
            *armed = true;
        }
    }

    /// Drop the socket, tell the owner, and schedule a reconnect if the
    /// retry budget allows.
    async fn handle_close(
        &mut self,
        ws: &mut Option<WsStream>,
        armed: &mut bool,
        sleep: Pin<&mut Sleep>,
    ) {
        *ws = None;
        let _ = self.events.send(ConnectionEvent::Closed).await;
        self.schedule_retry(armed, sleep).await;
    }

    /// Linear backoff: attempt N waits N x base_delay. Exhausting the budget
    /// clears the queue and is terminal until an explicit connect.
    async fn schedule_retry(&mut self, armed: &mut bool, mut sleep: Pin<&mut Sleep>) {
        if self.exhausted || self.url.is_none() {
            return;
        }
        if self.attempts < self.config.max_reconnect_attempts {
            self.attempts += 1;
            let delay = self.config.base_delay * self.attempts;
            debug!("Scheduling reconnect attempt {} in {:?}", self.attempts, delay);
            sleep.as_mut().reset(Instant::now() + delay);
            *armed = true;
        } else {
            warn!(
                "Giving up after {} reconnect attempts; dropping {} queued messages",
                self.attempts,
                self.queue.len()
            );
            self.exhausted = true;
            self.queue.clear();
            *armed = false;
            let _ = self.events.send(ConnectionEvent::RetriesExhausted).await;
        }
    }
}
