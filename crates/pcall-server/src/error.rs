//! Server startup errors

use crate::router::RouterError;
use pcall_config::ConfigError;
use thiserror::Error;

/// Errors from building or running an [`RpcServer`](crate::RpcServer).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
