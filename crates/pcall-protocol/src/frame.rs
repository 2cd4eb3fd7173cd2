//! Socket frames
//!
//! Each text frame is `{event, payload}` where every payload entry is tagged so
//! the receiver can rebuild it:
//!
//! - `object`: a JSON object or array, transmitted as its serialized text
//! - `literal`: a JSON scalar, transmitted unchanged
//! - `function`: recognised and always rejected; callables never cross the wire

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Frame encoding/decoding failures.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Malformed object argument at position {index}: {source}")]
    MalformedObject {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Function payloads are not supported (argument {0})")]
    FunctionPayload(usize),
}

/// One tagged payload entry as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Arg {
    Object(String),
    Literal(Value),
    Function(String),
}

impl Arg {
    /// Tag a plain value for transmission.
    pub fn encode(value: &Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Arg::Object(value.to_string()),
            scalar => Arg::Literal(scalar.clone()),
        }
    }

    /// Rebuild the plain value. `index` is only used for error reporting.
    pub fn decode(self, index: usize) -> Result<Value, FrameError> {
        match self {
            Arg::Object(text) => serde_json::from_str(&text)
                .map_err(|source| FrameError::MalformedObject { index, source }),
            Arg::Literal(value) => Ok(value),
            Arg::Function(_) => Err(FrameError::FunctionPayload(index)),
        }
    }
}

/// A named event with its tagged arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub payload: Vec<Arg>,
}

impl Frame {
    pub fn new(event: impl Into<String>, args: &[Value]) -> Self {
        Self {
            event: event.into(),
            payload: args.iter().map(Arg::encode).collect(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_text(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Split into event name and plain argument values.
    pub fn into_parts(self) -> Result<(String, Vec<Value>), FrameError> {
        let args = self
            .payload
            .into_iter()
            .enumerate()
            .map(|(index, arg)| arg.decode(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.event, args))
    }
}

/// Lifecycle of a socket connection, seen from either end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_tags() {
        let frame = Frame::new(
            "test",
            &[json!("str"), json!(42), json!({ "a": 1 }), json!([1, 2])],
        );
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            wire,
            json!({
                "event": "test",
                "payload": [
                    { "type": "literal", "value": "str" },
                    { "type": "literal", "value": 42 },
                    { "type": "object", "value": "{\"a\":1}" },
                    { "type": "object", "value": "[1,2]" },
                ]
            })
        );
    }

    #[test]
    fn test_parse_and_split() {
        let text = r#"{"event":"message:send","payload":[
            {"type":"object","value":"{\"userId\":\"u1\",\"text\":\"hi\"}"},
            {"type":"literal","value":"extra"}
        ]}"#;
        let (event, args) = Frame::parse(text).unwrap().into_parts().unwrap();
        assert_eq!(event, "message:send");
        assert_eq!(args, vec![json!({ "userId": "u1", "text": "hi" }), json!("extra")]);
    }

    #[test]
    fn test_function_payload_rejected() {
        let text = r#"{"event":"test","payload":[
            {"type":"literal","value":1},
            {"type":"function","value":"(a, b) => a + b"}
        ]}"#;
        let err = Frame::parse(text).unwrap().into_parts().unwrap_err();
        assert!(matches!(err, FrameError::FunctionPayload(1)));
    }

    #[test]
    fn test_unknown_tag_is_malformed() {
        let err = Frame::parse(r#"{"event":"x","payload":[{"type":"bigint","value":"1"}]}"#)
            .unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn test_bad_object_text() {
        let frame = Frame {
            event: "x".into(),
            payload: vec![Arg::Object("{oops".into())],
        };
        let err = frame.into_parts().unwrap_err();
        assert!(matches!(err, FrameError::MalformedObject { index: 0, .. }));
    }

    #[test]
    fn test_missing_payload_defaults_empty() {
        let frame = Frame::parse(r#"{"event":"ping"}"#).unwrap();
        assert!(frame.payload.is_empty());
    }
}
