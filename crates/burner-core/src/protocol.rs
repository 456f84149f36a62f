//! Wire protocol types
//!
//! Every frame exchanged with the room coordinator is a JSON envelope
//! `{"event": <name>, "data": <payload>}`. Lifecycle events produced by the
//! transport itself use the same payload conventions but never hit the wire.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TransportError;

/// Event names
pub mod events {
    /// First frame after upgrade, assigns the connection identifier
    pub const WELCOME: &str = "welcome";
    /// Outbound join request
    pub const JOIN_ROOM: &str = "join_room";
    /// Authoritative user count right after joining
    pub const USER_JOINED: &str = "user_joined";
    /// Membership change with a human-readable notice
    pub const USER_ACTIVITY: &str = "user_activity";
    /// Outbound chat message
    pub const SEND_MESSAGE: &str = "send_message";
    /// Chat message rebroadcast to every room member
    pub const RECEIVE_MESSAGE: &str = "receive_message";

    // Local lifecycle events
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
    pub const RECONNECT_ATTEMPT: &str = "reconnect_attempt";
    pub const RECONNECT_FAILED: &str = "reconnect_failed";
}

/// A single frame on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize an event and its payload into a text frame
    pub fn encode<T: Serialize>(event: &str, payload: &T) -> Result<String, TransportError> {
        let envelope = Envelope::new(event, serde_json::to_value(payload)?);
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Parse a text frame
    pub fn decode(frame: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Deserialize the payload into a typed structure
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// `welcome` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub connection_id: String,
}

/// `join_room` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: String,
    #[serde(rename = "username")]
    pub display_name: String,
}

/// `user_joined` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub user_count: u32,
}

/// `user_activity` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChanged {
    pub user_count: u32,
    #[serde(rename = "message")]
    pub notice: String,
}

/// `send_message` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSend {
    #[serde(rename = "message")]
    pub text: String,
}

/// `receive_message` payload, stamped by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDeliver {
    /// Coordinator-assigned id, used only to drop duplicate deliveries
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub id: Option<String>,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(rename = "sender")]
    pub sender_display_name: String,
    #[serde(rename = "senderId")]
    pub sender_connection_id: String,
    #[serde(rename = "timestamp", default, deserialize_with = "de::opt_timestamp")]
    pub sent_at: Option<DateTime<Utc>>,
}

/// `connect` lifecycle payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    pub connection_id: String,
    /// True when this follows an earlier connection of the same session
    pub recovered: bool,
}

/// Why a link went down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The coordinator closed the connection on purpose
    ServerDisconnect,
    /// The network dropped underneath us
    TransportClose,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerDisconnect => write!(f, "server disconnect"),
            DisconnectReason::TransportClose => write!(f, "transport close"),
        }
    }
}

/// `disconnect` lifecycle payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectInfo {
    pub reason: DisconnectReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransportError>,
}

/// `connect_error` lifecycle payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectErrorInfo {
    pub error: TransportError,
}

/// `reconnect_attempt` lifecycle payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectAttempt {
    pub attempt: u32,
    pub delay_ms: u64,
}

/// `reconnect_failed` lifecycle payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectFailed {
    pub attempts: u32,
}

mod de {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Int(i64),
        Float(f64),
    }

    pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<StringOrNumber>::deserialize(deserializer)?;
        Ok(value.map(|v| match v {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
            StringOrNumber::Float(n) => n.to_string(),
        }))
    }

    /// Accepts an RFC 3339 string or integer epoch milliseconds
    pub fn opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let value = Option::<StringOrNumber>::deserialize(deserializer)?;
        match value {
            None => Ok(None),
            Some(StringOrNumber::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(D::Error::custom),
            Some(StringOrNumber::Int(millis)) => Utc
                .timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| D::Error::custom("timestamp out of range")),
            Some(StringOrNumber::Float(millis)) => Utc
                .timestamp_millis_opt(millis as i64)
                .single()
                .map(Some)
                .ok_or_else(|| D::Error::custom("timestamp out of range")),
        }
    }
}
