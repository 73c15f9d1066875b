//! WebSocket module for the real-time notification stream.
//!
//! This module provides:
//! - Connection management with bounded exponential-backoff reconnect
//! - A typed event router with per-handler isolation
//! - A session binding that follows login/logout
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  SessionBinding                     │
//! │   (follows AuthState, owns the keep-alive task)     │
//! └─────────────────────────────────────────────────────┘
//!                         │ connect / disconnect
//!                         ▼
//!              ┌─────────────────────┐       ┌───────────┐
//!              │      WsClient       │──────▶│ Connector │
//!              │ (phase, retries,    │       │ (socket)  │
//!              │  generation)        │◀──────│           │
//!              └─────────────────────┘ text  └───────────┘
//!                         │
//!                         ▼
//!              ┌─────────────────────┐
//!              │    EventRouter      │
//!              │ exact │ message │   │
//!              │       │ urgent  │   │
//!              └─────────────────────┘
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │ Invalidate │ │   Toasts   │ │ Activity   │
//!   │  queries   │ │            │ │   feed     │
//!   └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = WsClient::new(ClientConfig::from_env()?, TungsteniteConnector)?;
//! client.on(EventKind::QueueUpdate, handler(|event| {
//!     println!("queue moved: {:?}", event.body());
//!     Ok(())
//! }));
//!
//! let (auth_tx, auth_rx) = watch::channel(AuthState::Unauthenticated);
//! let session = SessionBinding::new(client, auth_rx);
//! auth_tx.send_replace(AuthState::authenticated("42", jwt));
//! ```

mod connection;
mod router;
mod session;
mod transport;

pub use connection::{ConnectionState, WsClient};
pub use router::{handler, ClientEvent, EventRouter, Handler};
pub use session::{AuthState, Notice, SessionBinding};
pub use transport::{Connector, Transport, TungsteniteConnector};
