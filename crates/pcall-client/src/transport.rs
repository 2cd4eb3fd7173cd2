//! Wire transport under the links
//!
//! [`HttpTransport`] posts single requests to the endpoint URL and batches to
//! `<endpoint>?batch`. Reply bodies are parsed regardless of HTTP status:
//! error replies carry their status as well as a structured error body.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use pcall_protocol::{Request, Response, RpcError};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait Transport: Send + Sync {
    /// One request, one response.
    async fn call(&self, request: Request) -> Result<Response>;

    /// One round-trip for many requests. Replies are matched by id, so
    /// their order is not significant.
    async fn call_batch(&self, requests: Vec<Request>) -> Result<Vec<Response>>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    url: Url,
    batch_url: Url,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)?;
        let mut batch_url = url.clone();
        batch_url.set_query(Some("batch"));

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url,
            batch_url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post<B, T>(&self, url: &Url, body: &B) -> Result<T>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self.http.post(url.clone()).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(%url, %status, len = bytes.len(), "RPC reply");
        decode_reply(&bytes)
    }
}

/// Decode a reply body into `T`, or into the bare error the server sends
/// when it could not decode the request at all.
fn decode_reply<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| RpcError::parse_error(format!("Reply is not JSON: {}", e)))?;

    match serde_json::from_value::<T>(value.clone()) {
        Ok(reply) => Ok(reply),
        Err(shape) => match serde_json::from_value::<RpcError>(value) {
            Ok(err) => Err(ClientError::Rpc(err)),
            Err(_) => Err(ClientError::InvalidReply(shape.to_string())),
        },
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: Request) -> Result<Response> {
        self.post(&self.url, &request).await
    }

    async fn call_batch(&self, requests: Vec<Request>) -> Result<Vec<Response>> {
        self.post(&self.batch_url, &requests).await
    }
}
