//! Payload models pushed by the check-in server's notification service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- Status vocabularies ---

/// Reason code carried in `data.notification_type`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    CanStart,
    CanStartAfter,
    MarkedComplete,
    QueueUpdate,
    StatusChange,
    CompanyStatus,
    InterviewStarted,
    InterviewCompleted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Available,
    Paused,
    InInterview,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    Recruiting,
    Paused,
    #[serde(other)]
    Unknown,
}

/// How the server authenticated the socket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Jwt,
    Company,
}

// --- Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentRef {
    pub id: i64,
    pub name: String,
}

/// The `data` object of a pushed event.
///
/// Every field is optional because the server reuses one envelope for all
/// notification kinds; fields the client does not model are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<NotificationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ahead_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ahead_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_waiting: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_start: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CompanyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<StudentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<StudentStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_student_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_available_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_available: Vec<StudentRef>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventData {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Everything in a frame except its `type` tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventBody {
    #[serde(default, skip_serializing_if = "EventData::is_empty")]
    pub data: EventData,
    /// Set by the server on `can_start`, or synthesized by the router when
    /// re-publishing to the urgent bucket.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub urgent: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventBody {
    /// Decode a frame payload without ever rejecting it.
    ///
    /// When the payload does not fit the typed shape, `data` is kept if it
    /// still decodes on its own, the `urgent` flag is read loosely, and
    /// everything else (including an undecodable `data`) stays in `extra`.
    /// The typed decoding error is returned alongside.
    pub fn decode(payload: Map<String, Value>) -> (Self, Option<serde_json::Error>) {
        let error = match serde_json::from_value(Value::Object(payload.clone())) {
            Ok(body) => return (body, None),
            Err(e) => e,
        };

        let mut extra = payload;
        let data = match extra.get("data") {
            Some(Value::Null) => {
                extra.remove("data");
                EventData::default()
            }
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(data) => {
                    extra.remove("data");
                    data
                }
                Err(_) => EventData::default(),
            },
            None => EventData::default(),
        };
        let urgent = extra.remove("urgent").is_some_and(|v| flag_set(&v));

        (
            Self {
                data,
                urgent,
                extra,
            },
            Some(error),
        )
    }

    /// Human-readable text for toasts and banners, if the server sent one.
    pub fn message(&self) -> Option<&str> {
        self.data.message.as_deref()
    }

    /// Copy of this body carrying an explicit urgent marker.
    pub fn marked_urgent(&self) -> Self {
        Self {
            urgent: true,
            ..self.clone()
        }
    }
}

/// Loose truthiness for flags the server may send as `true`, `1` or `"yes"`.
pub fn flag_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
