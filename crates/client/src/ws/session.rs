//! Binds a [`WsClient`] to the application's authentication state.
//!
//! The binding follows an external `watch` channel of [`AuthState`]: login
//! connects with the bearer token, logout disconnects, and a rotated token
//! tears the socket down and re-opens it with the new one. Dropping the
//! binding always disconnects.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jobfair_shared::{EventBody, EventKind, Outbound};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::{ConnectionState, WsClient};
use super::router::{handler, ClientEvent, Handler};
use crate::config::Credentials;

/// Authentication state as published by the login layer.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated {
        user_id: String,
        access_token: String,
    },
}

impl AuthState {
    pub fn authenticated(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        AuthState::Authenticated {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    fn access_token(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { access_token, .. } => Some(access_token),
            AuthState::Unauthenticated => None,
        }
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthState::Unauthenticated => f.write_str("Unauthenticated"),
            AuthState::Authenticated { user_id, .. } => f
                .debug_struct("Authenticated")
                .field("user_id", user_id)
                .finish_non_exhaustive(),
        }
    }
}

/// The most recent notable event, for banner and toast display.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: EventKind,
    pub body: EventBody,
    pub urgent: bool,
    pub received_at: DateTime<Utc>,
}

/// Application-facing surface over one [`WsClient`].
pub struct SessionBinding {
    client: WsClient,
    notices: watch::Receiver<Option<Notice>>,
    registrations: Vec<(EventKind, Handler)>,
    auth_task: JoinHandle<()>,
    keepalive_task: Option<JoinHandle<()>>,
}

impl SessionBinding {
    /// Start following `auth`. Must be called inside a tokio runtime.
    pub fn new(client: WsClient, auth: watch::Receiver<AuthState>) -> Self {
        let (notice_tx, notices) = watch::channel(None);

        let record: Handler = handler(move |event: &ClientEvent| {
            if let Some(body) = event.body() {
                notice_tx.send_replace(Some(Notice {
                    kind: event.kind(),
                    body: body.clone(),
                    urgent: matches!(event, ClientEvent::Urgent(_)) || body.urgent,
                    received_at: Utc::now(),
                }));
            }
            Ok(())
        });
        let registrations = vec![
            (EventKind::Notification, record.clone()),
            (EventKind::Urgent, record),
        ];
        for (kind, h) in &registrations {
            client.on(kind.clone(), h.clone());
        }

        let auth_task = tokio::spawn(follow_auth(client.clone(), auth));

        Self {
            client,
            notices,
            registrations,
            auth_task,
            keepalive_task: None,
        }
    }

    /// Send a `ping` every `period` while connected.
    pub fn with_keepalive(mut self, period: Duration) -> Self {
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if client.is_connected() {
                    client.ping();
                }
            }
        });
        if let Some(previous) = self.keepalive_task.replace(task) {
            previous.abort();
        }
        self
    }

    /// Anonymous company entry: connect with an opaque per-company token,
    /// bypassing the user login path.
    pub fn connect_with_company_token(&self, token: impl Into<String>) {
        crate::log_info!("Connecting with company token");
        self.client.connect(Credentials::company(token));
    }

    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    pub fn reconnect(&self) {
        self.client.reconnect();
    }

    pub fn send(&self, message: impl Into<Outbound>) -> bool {
        self.client.send(message)
    }

    /// The application came back to the foreground. Suspended sockets do not
    /// always report a close, so reconnect unless already open.
    pub fn on_foreground(&self) {
        if !self.client.is_connected() {
            crate::log_info!("Foregrounded while disconnected, reconnecting");
            self.client.reconnect();
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.client.watch_state()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn last_notification(&self) -> Option<Notice> {
        self.notices.borrow().clone()
    }

    pub fn watch_notifications(&self) -> watch::Receiver<Option<Notice>> {
        self.notices.clone()
    }

    pub fn client(&self) -> &WsClient {
        &self.client
    }

    /// Explicit teardown; same as dropping.
    pub fn shutdown(self) {}
}

impl Drop for SessionBinding {
    fn drop(&mut self) {
        self.auth_task.abort();
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
        for (kind, h) in &self.registrations {
            self.client.off(kind, h);
        }
        self.client.disconnect();
    }
}

async fn follow_auth(client: WsClient, mut auth: watch::Receiver<AuthState>) {
    let mut current = AuthState::Unauthenticated;
    loop {
        let next = auth.borrow_and_update().clone();
        apply_transition(&client, &current, &next);
        current = next;

        if auth.changed().await.is_err() {
            crate::log_debug!("Auth source closed, keeping connection as is");
            return;
        }
    }
}

fn apply_transition(client: &WsClient, current: &AuthState, next: &AuthState) {
    if current == next {
        return;
    }
    match (current.access_token(), next.access_token()) {
        (None, Some(token)) => {
            crate::log_info!("Authenticated, connecting WebSocket");
            client.connect(Credentials::bearer(token));
        }
        (Some(_), None) => {
            crate::log_info!("Logged out, disconnecting WebSocket");
            client.disconnect();
        }
        (Some(_), Some(token)) => {
            crate::log_info!("Session changed, re-establishing WebSocket");
            client.disconnect();
            client.connect(Credentials::bearer(token));
        }
        (None, None) => {}
    }
}
