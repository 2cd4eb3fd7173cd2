//! Client entry point

use crate::batch::BatchScheduler;
use crate::error::Result;
use crate::link::{LinearLink, Link};
use crate::proxy::Proxy;
use crate::socket::{socket_url, SocketClient};
use crate::transport::{HttpTransport, Transport};
use pcall_config::{ClientConfig, LinkMode};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

struct Inner {
    url: String,
    link: Box<dyn Link>,
}

/// Handle to one pcall endpoint. Cheap to clone; clones share the link and
/// therefore the batch window.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Client for `url` with the default request timeout.
    pub fn new(url: impl Into<String>, mode: LinkMode) -> Result<Self> {
        Self::from_config(&ClientConfig {
            url: url.into(),
            link: mode,
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.url, config.request_timeout())?;
        Ok(Self::with_transport(&config.url, Arc::new(transport), config.link))
    }

    /// Client over a caller-supplied transport.
    pub fn with_transport(url: &str, transport: Arc<dyn Transport>, mode: LinkMode) -> Self {
        let link: Box<dyn Link> = match mode {
            LinkMode::Linear => Box::new(LinearLink::new(transport)),
            LinkMode::Batch(config) => Box::new(BatchScheduler::new(transport, config)),
        };
        debug!(%url, ?mode, "Client ready");
        Self {
            inner: Arc::new(Inner {
                url: url.to_string(),
                link,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Root of the dynamic call builder.
    pub fn api(&self) -> Proxy {
        Proxy::new(self.clone())
    }

    /// Call a procedure by dotted path.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.inner.link.call(method, params).await
    }

    pub fn socket_url(&self) -> String {
        socket_url(&self.inner.url)
    }

    /// New, unopened socket client for this endpoint.
    pub fn socket(&self) -> SocketClient {
        SocketClient::new(self.socket_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pcall_config::BatchConfig;
    use pcall_protocol::{ErrorKind, Request, Response, RpcError};
    use serde_json::json;
    use std::time::Duration;

    /// Answers `math.add` and records every request it sees.
    #[derive(Default)]
    struct Calculator {
        single: Mutex<Vec<Request>>,
        batches: Mutex<Vec<Vec<Request>>>,
    }

    fn answer(request: Request) -> Response {
        match request.method.as_str() {
            "math.add" => {
                let sum: i64 = request
                    .params
                    .as_array()
                    .map(|nums| nums.iter().filter_map(Value::as_i64).sum())
                    .unwrap_or(0);
                Response::success(request.id, json!(sum))
            }
            other => Response::failure(
                request.id,
                RpcError::new(ErrorKind::NotFound, format!("No procedure found at path: {}", other)),
            ),
        }
    }

    #[async_trait]
    impl Transport for Calculator {
        async fn call(&self, request: Request) -> Result<Response> {
            self.single.lock().push(request.clone());
            Ok(answer(request))
        }

        async fn call_batch(&self, requests: Vec<Request>) -> Result<Vec<Response>> {
            self.batches.lock().push(requests.clone());
            Ok(requests.into_iter().map(answer).collect())
        }
    }

    #[tokio::test]
    async fn test_linear_proxy_call() {
        let transport = Arc::new(Calculator::default());
        let client = Client::with_transport("http://test/rpc", transport.clone(), LinkMode::Linear);

        let sum = client.api().get("math").get("add").call(vec![json!([1, 2, 3])]).await.unwrap();
        assert_eq!(sum, json!(6));

        let err = client.api().get("math").get("sub").call(vec![]).await.unwrap_err();
        assert_eq!(err.rpc().unwrap().status(), ErrorKind::NotFound);

        let requests = transport.single.lock().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "math.add");
        assert_ne!(requests[0].id, requests[1].id);
    }

    #[tokio::test]
    async fn test_typed_query() {
        let client = Client::with_transport(
            "http://test/rpc",
            Arc::new(Calculator::default()),
            LinkMode::Linear,
        );
        let sum: i64 = client.api().get("math").get("add").query(&[4, 5]).await.unwrap();
        assert_eq!(sum, 9);

        let bad: Result<String> = client.api().get("math").get("add").query(&[1]).await;
        assert!(matches!(bad, Err(ClientError::InvalidReply(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_proxy_calls() {
        let transport = Arc::new(Calculator::default());
        let client = Client::with_transport(
            "http://test/rpc",
            transport.clone(),
            LinkMode::Batch(BatchConfig::new(10, Duration::from_millis(100))),
        );

        let add = client.api().get("math").get("add");
        let (a, b, c) = tokio::join!(
            add.call(vec![json!([1, 1])]),
            add.call(vec![json!([2, 2])]),
            client.call("math.mul", json!([3, 3])),
        );
        assert_eq!(a.unwrap(), json!(2));
        assert_eq!(b.unwrap(), json!(4));
        assert!(c.is_err());

        assert!(transport.single.lock().is_empty());
        let batches = transport.batches.lock().clone();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn test_socket_sub_client() {
        let client = Client::with_transport(
            "https://example.com/rpc",
            Arc::new(Calculator::default()),
            LinkMode::Linear,
        );
        let socket = client.api().get("$ws").socket().unwrap();
        assert_eq!(socket.url(), "wss://example.com/rpc/ws");
        assert!(client.api().get("math").socket().is_err());
    }

    #[test]
    fn test_socket_path_is_not_callable() {
        let client = Client::with_transport(
            "http://test/rpc",
            Arc::new(Calculator::default()),
            LinkMode::Linear,
        );
        let result = tokio_test::block_on(client.api().get("$ws").call(vec![]));
        assert!(matches!(result, Err(ClientError::InvalidCall(_))));
    }
}
