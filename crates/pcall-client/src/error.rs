use pcall_protocol::{RequestId, RpcError};
use thiserror::Error;

/// Client-side failures.
///
/// `Clone` because a failed batch hands the same error to every caller in it.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The server answered with a structured error.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    #[error("No response for request {0}")]
    MissingResponse(RequestId),

    #[error("Batch scheduler dropped the call before replying")]
    Canceled,

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Socket is not open")]
    NotConnected,

    #[error("Invalid call: {0}")]
    InvalidCall(String),
}

impl ClientError {
    /// The structured RPC error, if the server produced one.
    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            ClientError::Rpc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Url(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Socket(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
