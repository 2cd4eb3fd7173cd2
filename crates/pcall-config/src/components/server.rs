//! Server component configuration
//!
//! Bind address, endpoint paths and socket-layer policy for `pcall-server`.

use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// HTTP + WebSocket host adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path that accepts single and batched RPC POSTs.
    pub endpoint: String,
    /// Path that upgrades to the socket layer.
    pub ws_path: String,
    pub max_body_size_mb: usize,
    pub enable_cors: bool,
    /// Allowed origins when CORS is enabled. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Drop a channel once its last member leaves or disconnects.
    /// Channels created with an explicit context are never pruned.
    pub prune_empty_channels: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            endpoint: "/rpc".to_string(),
            ws_path: "/rpc/ws".to_string(),
            max_body_size_mb: 10,
            enable_cors: false,
            cors_origins: Vec::new(),
            prune_empty_channels: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, path) in [("endpoint", &self.endpoint), ("ws_path", &self.ws_path)] {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "server.{} must start with '/', got {:?}",
                    name, path
                )));
            }
        }
        if self.endpoint == self.ws_path {
            return Err(ConfigError::Invalid(
                "server.endpoint and server.ws_path must differ".to_string(),
            ));
        }
        if self.max_body_size_mb == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_size_mb must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
