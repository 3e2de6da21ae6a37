//! Client SDK for the onchat WebSocket protocol.
//!
//! One [`SocketClient`] owns one WebSocket connection to the chat backend.
//! Every outbound call is wrapped in the `onchat` envelope, queued while the
//! connection is down, and flushed in order once it opens. Every inbound
//! frame is fanned out to all registered listeners; the wire carries no
//! request ids, so consumers filter frames by event name.
//!
//! ```rust,no_run
//! use onchat_sdk::{ClientConfig, MemorySessionStore, SocketClient};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let client = SocketClient::new(ClientConfig::default(), Arc::new(MemorySessionStore::default()));
//! let _sub = client.on_message(|frame| println!("{} {:?}", frame.event(), frame.data()));
//! client.login("alice", "secret");
//! # }
//! ```

pub mod client;
pub mod config;
pub mod debounce;
pub mod envelope;
pub mod error;
pub mod event;
pub mod listener;
pub mod models;
pub mod queue;
pub mod request;
pub mod session;
pub mod transport;

pub use client::{ConnectionState, SocketClient};
pub use config::{ClientConfig, QueuePolicy, ReconnectPolicy};
pub use envelope::{InboundFrame, OutboundEnvelope};
pub use error::{Error, Result};
pub use event::EventName;
pub use listener::Subscription;
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionCredential, SessionStore};
pub use transport::{Connector, Transport, TransportEvent, WsConnector};
