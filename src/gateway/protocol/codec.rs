//! Frame codec
//!
//! Turns frames into transport text and back. Decoding never panics: every
//! malformed input maps to a [`DecodeError`] that the session logs and drops.

use serde_json::Value;
use thiserror::Error;

use super::schema::{EventFrame, GatewayFrame, RequestFrame, ResponseFrame};
use crate::error::Result;

/// Why an inbound message could not be turned into a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not valid JSON
    #[error("malformed JSON: {0}")]
    Malformed(String),

    /// Valid JSON, but not an object
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Object has no `type` string
    #[error("frame has no `type` discriminant")]
    MissingType,

    /// `type` is not one of `req`, `res`, `event`
    #[error("unknown frame type `{0}`")]
    UnknownType(String),

    /// Known type, but required fields are missing or mistyped
    #[error("invalid `{kind}` frame: {reason}")]
    InvalidFrame {
        /// Frame discriminant
        kind: &'static str,
        /// Underlying serde message
        reason: String,
    },
}

/// Serialize a frame to its wire text
pub fn encode(frame: &GatewayFrame) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}

/// Parse wire text into a frame
pub fn decode(text: &str) -> std::result::Result<GatewayFrame, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    decode_value(value)
}

/// Parse raw bytes into a frame
pub fn decode_bytes(bytes: &[u8]) -> std::result::Result<GatewayFrame, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    decode_value(value)
}

fn decode_value(value: Value) -> std::result::Result<GatewayFrame, DecodeError> {
    let kind = match &value {
        Value::Object(map) => match map.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(DecodeError::MissingType),
        },
        _ => return Err(DecodeError::NotAnObject),
    };

    match kind.as_str() {
        "req" => serde_json::from_value::<RequestFrame>(value)
            .map(GatewayFrame::Request)
            .map_err(|e| invalid("req", e)),
        "res" => serde_json::from_value::<ResponseFrame>(value)
            .map(GatewayFrame::Response)
            .map_err(|e| invalid("res", e)),
        "event" => serde_json::from_value::<EventFrame>(value)
            .map(GatewayFrame::Event)
            .map_err(|e| invalid("event", e)),
        _ => Err(DecodeError::UnknownType(kind)),
    }
}

fn invalid(kind: &'static str, err: serde_json::Error) -> DecodeError {
    DecodeError::InvalidFrame {
        kind,
        reason: err.to_string(),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::gateway::protocol::schema::ErrorShape;
    use proptest::prelude::*;

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9 ]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    fn error_shape() -> impl Strategy<Value = ErrorShape> {
        (
            proptest::option::of("[A-Z_]{1,12}"),
            proptest::option::of("[a-z ]{0,20}"),
            proptest::option::of(json_value()),
            proptest::option::of(any::<bool>()),
            proptest::option::of(any::<u64>()),
        )
            .prop_map(|(code, message, details, retryable, retry_after_ms)| ErrorShape {
                code,
                message,
                details,
                retryable,
                retry_after_ms,
            })
    }

    fn frame() -> impl Strategy<Value = GatewayFrame> {
        prop_oneof![
            ("[a-f0-9-]{1,36}", "[a-z.]{1,16}", proptest::option::of(json_value())).prop_map(
                |(id, method, params)| GatewayFrame::Request(RequestFrame { id, method, params })
            ),
            (
                "[a-f0-9-]{1,36}",
                any::<bool>(),
                proptest::option::of(json_value()),
                proptest::option::of(error_shape()),
            )
                .prop_map(|(id, ok, payload, error)| {
                    GatewayFrame::Response(ResponseFrame { id, ok, payload, error })
                }),
            (
                "[a-z.]{1,16}",
                json_value(),
                proptest::option::of(any::<u64>()),
                proptest::option::of(json_value()),
            )
                .prop_map(|(event, payload, seq, state_version)| {
                    GatewayFrame::Event(EventFrame {
                        event,
                        payload,
                        seq,
                        state_version,
                    })
                }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn test_decode_inverts_encode(frame in frame()) {
            let text = encode(&frame).unwrap();
            prop_assert_eq!(decode(&text).unwrap(), frame);
        }

        #[test]
        fn test_decode_never_panics(text in ".{0,64}") {
            let _ = decode(&text);
        }
    }
}
