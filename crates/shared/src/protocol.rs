//! Wire protocol for the `/ws/notifications/` socket.
//!
//! Inbound frames are JSON objects tagged by a `type` string. The tag is
//! resolved into an [`EventKind`] first so that tags the client does not know
//! yet still route (as [`ServerEvent::Other`]) instead of failing to decode.
//! A known tag whose payload does not fit the typed model still routes under
//! its own kind, with a best-effort body.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::models::{flag_set, AuthType, EventBody};

/// Default socket path on the check-in server.
pub const NOTIFICATIONS_PATH: &str = "/ws/notifications/";

/// Query parameter carrying a student/admin JWT.
pub const QUERY_TOKEN: &str = "token";

/// Query parameter carrying a company access token.
pub const QUERY_COMPANY_TOKEN: &str = "company_token";

/// Routing key for the handler registry.
///
/// `Connection`, `Error` and `Message` are never sent by the server: the
/// first two are emitted by the connection manager, `Message` is the
/// wildcard bucket every parsed frame is republished to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connection,
    Error,
    Message,
    ConnectionEstablished,
    Pong,
    Notification,
    Urgent,
    CanStart,
    QueueUpdate,
    StatusChange,
    InterviewStarted,
    InterviewCompleted,
    CompanyStatus,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Connection => "connection",
            EventKind::Error => "error",
            EventKind::Message => "message",
            EventKind::ConnectionEstablished => "connection_established",
            EventKind::Pong => "pong",
            EventKind::Notification => "notification",
            EventKind::Urgent => "urgent",
            EventKind::CanStart => "can_start",
            EventKind::QueueUpdate => "queue_update",
            EventKind::StatusChange => "status_change",
            EventKind::InterviewStarted => "interview_started",
            EventKind::InterviewCompleted => "interview_completed",
            EventKind::CompanyStatus => "company_status",
            EventKind::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "connection" => EventKind::Connection,
            "error" => EventKind::Error,
            "message" => EventKind::Message,
            "connection_established" => EventKind::ConnectionEstablished,
            "pong" => EventKind::Pong,
            "notification" => EventKind::Notification,
            "urgent" => EventKind::Urgent,
            "can_start" => EventKind::CanStart,
            "queue_update" => EventKind::QueueUpdate,
            "status_change" => EventKind::StatusChange,
            "interview_started" => EventKind::InterviewStarted,
            "interview_completed" => EventKind::InterviewCompleted,
            "company_status" => EventKind::CompanyStatus,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Ok(EventKind::from_tag(tag))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported on the locally synthesized `connection` event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Failed => "failed",
        })
    }
}

/// Server handshake sent right after the socket is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Handshake {
    #[serde(default)]
    pub auth_type: Option<AuthType>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A typed inbound event, with its `type` tag already consumed.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ConnectionEstablished(Handshake),
    Pong {
        extra: Map<String, Value>,
    },
    Notification(EventBody),
    Urgent(EventBody),
    CanStart(EventBody),
    QueueUpdate(EventBody),
    StatusChange(EventBody),
    InterviewStarted(EventBody),
    InterviewCompleted(EventBody),
    CompanyStatus(EventBody),
    /// Any tag this client does not model, with the untouched payload.
    Other {
        kind: String,
        payload: Map<String, Value>,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::ConnectionEstablished(_) => EventKind::ConnectionEstablished,
            ServerEvent::Pong { .. } => EventKind::Pong,
            ServerEvent::Notification(_) => EventKind::Notification,
            ServerEvent::Urgent(_) => EventKind::Urgent,
            ServerEvent::CanStart(_) => EventKind::CanStart,
            ServerEvent::QueueUpdate(_) => EventKind::QueueUpdate,
            ServerEvent::StatusChange(_) => EventKind::StatusChange,
            ServerEvent::InterviewStarted(_) => EventKind::InterviewStarted,
            ServerEvent::InterviewCompleted(_) => EventKind::InterviewCompleted,
            ServerEvent::CompanyStatus(_) => EventKind::CompanyStatus,
            ServerEvent::Other { kind, .. } => EventKind::Other(kind.clone()),
        }
    }

    /// The shared notification envelope, for the variants that use one.
    pub fn body(&self) -> Option<&EventBody> {
        match self {
            ServerEvent::Notification(body)
            | ServerEvent::Urgent(body)
            | ServerEvent::CanStart(body)
            | ServerEvent::QueueUpdate(body)
            | ServerEvent::StatusChange(body)
            | ServerEvent::InterviewStarted(body)
            | ServerEvent::InterviewCompleted(body)
            | ServerEvent::CompanyStatus(body) => Some(body),
            ServerEvent::ConnectionEstablished(_)
            | ServerEvent::Pong { .. }
            | ServerEvent::Other { .. } => None,
        }
    }

    /// Build the typed event for `kind`. Never fails: a payload that does
    /// not fit is decoded best-effort and the decoding error is returned
    /// alongside.
    fn from_parts(
        kind: &EventKind,
        payload: Map<String, Value>,
    ) -> (Self, Option<ProtocolError>) {
        let invalid = |source: serde_json::Error| ProtocolError::InvalidPayload {
            kind: kind.to_string(),
            source,
        };
        let typed = |wrap: fn(EventBody) -> ServerEvent, payload: Map<String, Value>| {
            let (body, error) = EventBody::decode(payload);
            (wrap(body), error.map(&invalid))
        };

        match kind {
            EventKind::ConnectionEstablished => {
                match serde_json::from_value(Value::Object(payload.clone())) {
                    Ok(handshake) => (ServerEvent::ConnectionEstablished(handshake), None),
                    Err(source) => (
                        ServerEvent::ConnectionEstablished(Handshake {
                            extra: payload,
                            ..Handshake::default()
                        }),
                        Some(invalid(source)),
                    ),
                }
            }
            EventKind::Pong => (ServerEvent::Pong { extra: payload }, None),
            EventKind::Notification => typed(ServerEvent::Notification, payload),
            EventKind::Urgent => typed(ServerEvent::Urgent, payload),
            EventKind::CanStart => typed(ServerEvent::CanStart, payload),
            EventKind::QueueUpdate => typed(ServerEvent::QueueUpdate, payload),
            EventKind::StatusChange => typed(ServerEvent::StatusChange, payload),
            EventKind::InterviewStarted => typed(ServerEvent::InterviewStarted, payload),
            EventKind::InterviewCompleted => typed(ServerEvent::InterviewCompleted, payload),
            EventKind::CompanyStatus => typed(ServerEvent::CompanyStatus, payload),
            // Local-only tags arriving from the wire are passed through untyped.
            other => (
                ServerEvent::Other {
                    kind: other.as_str().to_string(),
                    payload,
                },
                None,
            ),
        }
    }
}

/// One parsed text frame: the typed event plus the original JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub event: ServerEvent,
    /// The full frame, `type` included, as received.
    pub raw: Value,
    /// Every `can_start`, and any frame whose payload sets `urgent`.
    pub urgent: bool,
    /// Why the payload did not fit its typed model; `event` then holds a
    /// best-effort decode.
    pub decode_error: Option<String>,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: Value = serde_json::from_str(text).map_err(ProtocolError::Json)?;
        let Value::Object(mut payload) = raw.clone() else {
            return Err(ProtocolError::NotAnObject);
        };

        let tag = match payload.remove("type") {
            Some(Value::String(tag)) => tag,
            Some(_) => return Err(ProtocolError::InvalidType),
            None => return Err(ProtocolError::MissingType),
        };

        let kind = EventKind::from_tag(&tag);
        let urgent = kind == EventKind::CanStart || payload.get("urgent").is_some_and(flag_set);
        let (event, error) = ServerEvent::from_parts(&kind, payload);
        Ok(Self {
            event,
            raw,
            urgent,
            decode_error: error.map(|e| e.to_string()),
        })
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Outbound frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Keep-alive; the server answers with `pong`.
    Ping,
    /// Reserved by the server for per-company subscriptions.
    Subscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        company_id: Option<i64>,
    },
}

/// Anything the client may put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Command(ClientCommand),
    Raw(Value),
}

impl Outbound {
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        match self {
            Outbound::Command(cmd) => serde_json::to_string(cmd),
            Outbound::Raw(value) => serde_json::to_string(value),
        }
        .map_err(ProtocolError::Json)
    }
}

impl From<ClientCommand> for Outbound {
    fn from(cmd: ClientCommand) -> Self {
        Outbound::Command(cmd)
    }
}

impl From<Value> for Outbound {
    fn from(value: Value) -> Self {
        Outbound::Raw(value)
    }
}
