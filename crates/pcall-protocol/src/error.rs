//! RPC error model
//!
//! Every user-visible failure crosses the wire as an [`RpcError`]. The set of
//! kinds is closed and each kind maps to exactly one HTTP-style status code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of RPC error kinds.
///
/// Serialized in `SCREAMING_SNAKE_CASE`, e.g. `NOT_FOUND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ParseError,
    InputParseError,
    OutputParseError,
    BadRequest,
    InternalServerError,
    NotImplemented,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnprocessableContent,
    TooManyRequests,
    ClientClosedRequest,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 17] = [
        ErrorKind::ParseError,
        ErrorKind::InputParseError,
        ErrorKind::OutputParseError,
        ErrorKind::BadRequest,
        ErrorKind::InternalServerError,
        ErrorKind::NotImplemented,
        ErrorKind::Unauthorized,
        ErrorKind::Forbidden,
        ErrorKind::NotFound,
        ErrorKind::MethodNotSupported,
        ErrorKind::Timeout,
        ErrorKind::Conflict,
        ErrorKind::PreconditionFailed,
        ErrorKind::PayloadTooLarge,
        ErrorKind::UnprocessableContent,
        ErrorKind::TooManyRequests,
        ErrorKind::ClientClosedRequest,
    ];

    /// Transport status code for this kind.
    ///
    /// The three parse-error kinds share 418 so clients can tell a decoding
    /// failure apart from an ordinary 4xx/5xx.
    pub const fn code(self) -> u16 {
        match self {
            ErrorKind::ParseError => 418,
            ErrorKind::InputParseError => 418,
            ErrorKind::OutputParseError => 418,
            ErrorKind::BadRequest => 400,
            ErrorKind::InternalServerError => 500,
            ErrorKind::NotImplemented => 501,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotSupported => 405,
            ErrorKind::Timeout => 408,
            ErrorKind::Conflict => 409,
            ErrorKind::PreconditionFailed => 412,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::UnprocessableContent => 422,
            ErrorKind::TooManyRequests => 429,
            ErrorKind::ClientClosedRequest => 499,
        }
    }

    /// Wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::InputParseError => "INPUT_PARSE_ERROR",
            ErrorKind::OutputParseError => "OUTPUT_PARSE_ERROR",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorKind::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorKind::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            ErrorKind::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorKind::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transmissible RPC failure.
///
/// Immutable once built. `code` is always derived from `status`, also when
/// decoding from the wire, so a peer cannot send a mismatched pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(from = "WireError")]
#[error("{status}: {message}")]
pub struct RpcError {
    code: u16,
    status: ErrorKind,
    message: String,
}

#[derive(Deserialize)]
struct WireError {
    status: ErrorKind,
    #[serde(default)]
    message: Option<String>,
}

impl From<WireError> for RpcError {
    fn from(wire: WireError) -> Self {
        match wire.message {
            Some(message) => RpcError::new(wire.status, message),
            None => RpcError::from_kind(wire.status),
        }
    }
}

impl RpcError {
    /// Error of kind `status`; the code follows from the kind.
    pub fn new(status: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: status.code(),
            status,
            message: message.into(),
        }
    }

    /// Error whose message is the kind's wire name.
    pub fn from_kind(status: ErrorKind) -> Self {
        Self::new(status, status.as_str())
    }

    /// `PARSE_ERROR`, for bodies that do not decode.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    /// `NOT_FOUND`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// `INTERNAL_SERVER_ERROR`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalServerError, message)
    }

    /// Error kind.
    pub fn status(&self) -> ErrorKind {
        self.status
    }

    /// HTTP-style status code of the kind.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ErrorKind> for RpcError {
    fn from(kind: ErrorKind) -> Self {
        RpcError::from_kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_errors_use_teapot_code() {
        assert_eq!(ErrorKind::ParseError.code(), 418);
        assert_eq!(ErrorKind::InputParseError.code(), 418);
        assert_eq!(ErrorKind::OutputParseError.code(), 418);
    }

    #[test]
    fn test_code_table() {
        assert_eq!(ErrorKind::BadRequest.code(), 400);
        assert_eq!(ErrorKind::InternalServerError.code(), 500);
        assert_eq!(ErrorKind::NotFound.code(), 404);
        assert_eq!(ErrorKind::TooManyRequests.code(), 429);
        assert_eq!(ErrorKind::ClientClosedRequest.code(), 499);
    }

    #[test]
    fn test_wire_names_match_serde() {
        for kind in ErrorKind::ALL {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
        }
    }

    #[test]
    fn test_error_json_shape() {
        let err = RpcError::new(ErrorKind::Forbidden, "nope");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            json!({ "code": 403, "status": "FORBIDDEN", "message": "nope" })
        );
    }

    #[test]
    fn test_decode_recomputes_code() {
        let err: RpcError =
            serde_json::from_value(json!({ "code": 200, "status": "CONFLICT", "message": "x" }))
                .unwrap();
        assert_eq!(err.code(), 409);
        assert_eq!(err.status(), ErrorKind::Conflict);
    }

    #[test]
    fn test_decode_without_message() {
        let err: RpcError = serde_json::from_value(json!({ "status": "TIMEOUT" })).unwrap();
        assert_eq!(err.message(), "TIMEOUT");
        assert_eq!(err.code(), 408);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result: Result<RpcError, _> =
            serde_json::from_value(json!({ "code": 1, "status": "TEAPOT", "message": "x" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_display() {
        let err = RpcError::not_found("users.nope");
        assert_eq!(err.to_string(), "NOT_FOUND: users.nope");
    }
}
