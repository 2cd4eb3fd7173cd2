//! How a logical call reaches the server

use crate::batch::BatchScheduler;
use crate::error::Result;
use crate::transport::Transport;
use async_trait::async_trait;
use pcall_protocol::{Request, RequestId};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait Link: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}

/// One round-trip per call.
pub struct LinearLink {
    transport: Arc<dyn Transport>,
    next_id: AtomicI64,
}

impl LinearLink {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl Link for LinearLink {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(%id, %method, "Calling");

        let response = self
            .transport
            .call(Request::new(id.clone(), method, params))
            .await?;
        if response.id != id {
            warn!(sent = %id, received = %response.id, "Reply id does not match request");
        }

        response.into_result().map_err(|err| {
            debug!(%method, status = %err.status(), "Call failed");
            err.into()
        })
    }
}

#[async_trait]
impl Link for BatchScheduler {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.add_request(method, params).await
    }
}
