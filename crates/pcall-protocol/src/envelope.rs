//! Request/response envelopes
//!
//! Transport-independent wire shapes. A single call is one [`Request`]; a batch
//! is a JSON array of them. Replies are correlated by `id`, never by position.

use crate::error::RpcError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version carried in every envelope.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Request ID (can be string or number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

/// One procedure invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Dotted procedure path, e.g. `users.getById`.
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

impl Request {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            jsonrpc: default_version(),
            method: method.into(),
            params,
        }
    }
}

/// Outcome of one invocation. Exactly one of result or error exists by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

/// Reply to one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResponse", try_from = "WireResponse")]
pub struct Response {
    pub id: RequestId,
    pub jsonrpc: String,
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: RequestId, result: impl Into<Value>) -> Self {
        Self {
            id,
            jsonrpc: default_version(),
            outcome: Outcome::Result(result.into()),
        }
    }

    pub fn failure(id: RequestId, error: RpcError) -> Self {
        Self {
            id,
            jsonrpc: default_version(),
            outcome: Outcome::Error(error),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(err) => Some(err),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(err) => Err(err),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    id: RequestId,
    #[serde(default = "default_version")]
    jsonrpc: String,
    // `"result": null` is a real result, so presence is tracked separately
    // from the value.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl From<Response> for WireResponse {
    fn from(response: Response) -> Self {
        let (result, error) = match response.outcome {
            Outcome::Result(value) => (Some(value), None),
            Outcome::Error(err) => (None, Some(err)),
        };
        Self {
            id: response.id,
            jsonrpc: response.jsonrpc,
            result,
            error,
        }
    }
}

impl TryFrom<WireResponse> for Response {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        let outcome = match (wire.result, wire.error) {
            (Some(value), None) => Outcome::Result(value),
            (None, Some(err)) => Outcome::Error(err),
            (Some(_), Some(_)) => {
                return Err(format!(
                    "response {} carries both result and error",
                    wire.id
                ))
            }
            (None, None) => {
                return Err(format!(
                    "response {} carries neither result nor error",
                    wire.id
                ))
            }
        };
        Ok(Self {
            id: wire.id,
            jsonrpc: wire.jsonrpc,
            outcome,
        })
    }
}

/// Inbound body: one request or a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Single(Request),
    Batch(Vec<Request>),
}

impl Payload {
    /// Decode a raw body.
    ///
    /// Malformed JSON and JSON that is not a request (or array of requests)
    /// both fail with `PARSE_ERROR`; no request id is known at this point.
    pub fn decode(body: &[u8]) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RpcError::parse_error(format!("Invalid JSON: {}", e)))?;

        if value.is_array() {
            serde_json::from_value(value)
                .map(Payload::Batch)
                .map_err(|e| RpcError::parse_error(format!("Invalid batch: {}", e)))
        } else {
            serde_json::from_value(value)
                .map(Payload::Single)
                .map_err(|e| RpcError::parse_error(format!("Invalid request: {}", e)))
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Payload::Batch(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Single(_) => 1,
            Payload::Batch(requests) => requests.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outbound body mirroring the [`Payload`] shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Single(Response),
    Batch(Vec<Response>),
}
