//! Gateway protocol schema
//!
//! Defines the wire format for gateway messages. Every transport message
//! carries exactly one JSON object discriminated by its `type` field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Protocol version spoken by this client
pub const PROTOCOL_VERSION: u32 = 3;

/// Gateway frame - Top-level message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayFrame {
    /// Request from client
    #[serde(rename = "req")]
    Request(RequestFrame),
    /// Response from server
    #[serde(rename = "res")]
    Response(ResponseFrame),
    /// Event pushed by server
    #[serde(rename = "event")]
    Event(EventFrame),
}

impl GatewayFrame {
    /// Wire discriminant of this frame
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayFrame::Request(_) => "req",
            GatewayFrame::Response(_) => "res",
            GatewayFrame::Event(_) => "event",
        }
    }
}

/// Request frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation ID, unique per connection
    pub id: String,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Response frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Request ID this responds to
    pub id: String,
    /// Whether the request succeeded
    pub ok: bool,
    /// Result (success)
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Error (failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

/// Event frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    /// Namespaced event tag, e.g. `agent` or `connect.challenge`
    pub event: String,
    /// Event data
    #[serde(default)]
    pub payload: Value,
    /// Gateway-wide sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Version of the server state this event was derived from
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub state_version: Option<Value>,
}

/// Absent field is `None`; an explicit `null` stays `Some(Value::Null)`
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Error carried by a failed response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorShape {
    /// Error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Additional data
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Whether the server considers the call retryable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    /// Suggested wait before retrying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Standard error codes
pub mod error_codes {
    /// Device has not been approved yet
    pub const NOT_PAIRED: &str = "NOT_PAIRED";
    /// Fallback code when the server supplies none
    pub const UNKNOWN: &str = "UNKNOWN";
    /// Fallback message when the server supplies none
    pub const GENERIC_FAILURE: &str = "request failed";
    /// Message fragment the gateway uses for unapproved devices
    pub const PAIRING_REQUIRED_HINT: &str = "pairing required";
}

/// WebSocket close codes used by the client
pub mod close_codes {
    /// Intentional disconnect
    pub const NORMAL: u16 = 1000;
    /// No tick from the gateway within the watchdog window
    pub const TICK_TIMEOUT: u16 = 4000;
    /// Handshake rejected or timed out
    pub const HANDSHAKE_FAILED: u16 = 4008;
}

impl ErrorShape {
    /// Create a new error shape
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorShape {
            code: Some(code.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Code, or `UNKNOWN` if absent
    pub fn code_or_default(&self) -> &str {
        self.code.as_deref().unwrap_or(error_codes::UNKNOWN)
    }

    /// Message, or the generic failure text if absent
    pub fn message_or_default(&self) -> &str {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(error_codes::GENERIC_FAILURE)
    }

    /// Whether this error means the device is waiting for pairing approval
    pub fn is_pairing_required(&self) -> bool {
        self.code.as_deref() == Some(error_codes::NOT_PAIRED)
            || self
                .message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(error_codes::PAIRING_REQUIRED_HINT))
    }
}

impl RequestFrame {
    /// Create a request
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        RequestFrame {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

impl ResponseFrame {
    /// Create a success response
    pub fn success(id: impl Into<String>, payload: Value) -> Self {
        ResponseFrame {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: impl Into<String>, error: ErrorShape) -> Self {
        ResponseFrame {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

impl EventFrame {
    /// Create a new event
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        EventFrame {
            event: event.into(),
            payload,
            seq: None,
            state_version: None,
        }
    }

    /// Set the sequence number
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }
}
