//! Jobfair Client - real-time notification stream
//!
//! This crate contains the reconnecting WebSocket client the job fair
//! dashboards use to learn about queue movement, interview starts and
//! status changes as they happen.

#[macro_use]
pub mod logging;

pub mod config;
pub mod consumers;
pub mod error;
pub mod storage;
pub mod ws;

pub use config::{ClientConfig, Credentials, ReconnectConfig};
pub use consumers::{
    install_default_consumers, ConsumerGuard, QueryGroup, QueryInvalidator, ToastLevel, Toaster,
};
pub use error::{ClientError, TransportError};
pub use storage::TokenStore;
pub use ws::{
    handler, AuthState, ClientEvent, ConnectionState, Connector, EventRouter, Handler, Notice,
    SessionBinding, Transport, TungsteniteConnector, WsClient,
};
