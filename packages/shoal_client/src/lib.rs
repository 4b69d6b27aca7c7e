//! # Shoal Client
//!
//! Client-side engine for live agent conversations over a persistent
//! WebSocket. Keeps exactly one logical connection alive (reconnecting with
//! linear backoff and queueing outbound messages while down), multiplexes
//! any number of conversation threads through it, and merges the incremental
//! event stream into ordered transcripts via [`shoal_convo`].
//!
//! Rendering, editing, and storage are external collaborators: they consume
//! the transcript through [`AgentClient`] accessors and
//! [`AgentClient::subscribe`] notifications, and feed it through
//! [`AgentClient::submit_user_message`] and [`AgentClient::request_cancel`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shoal_client::{AgentClient, ClientConfig};
//!
//! # async fn demo() -> Result<(), shoal_client::ClientError> {
//! let client = AgentClient::new(ClientConfig::default());
//! client.connect_to("ws://localhost:4400/ws").await?;
//!
//! let mut updates = client.subscribe();
//! client.submit_user_message("hello").await?;
//! while let Ok(update) = updates.recv().await {
//!     println!("{:?} -> {} messages", update, client.messages().await?.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod sessions;

pub use client::{AgentClient, ClientUpdate};
pub use config::{ClientConfig, ConnectionConfig, FileConfig, load_config};
pub use connection::{ConnectionEvent, ConnectionHandle, ConnectionStats, spawn_connection};
pub use error::{ClientError, Result};
pub use protocol::{ClientMessage, ServerMessage};
pub use sessions::{SessionInfo, SessionMultiplexer};
