//! Request dispatch over a [`FlatRouter`]
//!
//! Every call yields exactly one [`Response`] carrying the request's id.
//! Procedure failures, including panics, are turned into [`RpcError`]s here so
//! nothing escapes to the transport.

use crate::router::FlatRouter;
use futures::future::join_all;
use futures::FutureExt;
use pcall_protocol::{Payload, Reply, Request, RequestId, Response, RpcError};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Run one request against the router.
pub async fn dispatch<C>(router: &FlatRouter<C>, request: Request, ctx: C) -> Response
where
    C: Send + 'static,
{
    let Request {
        id, method, params, ..
    } = request;

    let Some(procedure) = router.get(&method) else {
        debug!(%id, %method, "No procedure at path");
        return Response::failure(
            id,
            RpcError::not_found(format!("No procedure found at path: {}", method)),
        );
    };

    debug!(%id, %method, "Dispatching call");
    match AssertUnwindSafe(procedure.call(params, ctx))
        .catch_unwind()
        .await
    {
        Ok(Ok(value)) => Response::success(id, value),
        Ok(Err(err)) => Response::failure(id, into_rpc_error(&method, err)),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(%method, panic = %message, "Procedure panicked");
            Response::failure(id, RpcError::internal(message))
        }
    }
}

/// Run every request concurrently; responses keep the input order.
pub async fn dispatch_batch<C>(
    router: &FlatRouter<C>,
    requests: Vec<Request>,
    ctx: C,
) -> Vec<Response>
where
    C: Clone + Send + 'static,
{
    join_all(
        requests
            .into_iter()
            .map(|request| dispatch(router, request, ctx.clone())),
    )
    .await
}

/// Answer a decoded payload with the reply of the same shape.
pub async fn handle<C>(router: &FlatRouter<C>, payload: Payload, ctx: C) -> Reply
where
    C: Clone + Send + 'static,
{
    match payload {
        Payload::Single(request) => Reply::Single(dispatch(router, request, ctx).await),
        Payload::Batch(requests) => Reply::Batch(dispatch_batch(router, requests, ctx).await),
    }
}

fn into_rpc_error(method: &str, err: anyhow::Error) -> RpcError {
    match err.downcast::<RpcError>() {
        Ok(rpc) => {
            debug!(%method, status = %rpc.status(), "Procedure returned RPC error");
            rpc
        }
        Err(other) => {
            error!(%method, error = %format!("{:#}", other), "Procedure failed");
            RpcError::internal(other.to_string())
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Procedure panicked".to_string()
    }
}

/// In-process caller bound to one context.
///
/// Same semantics as a remote call, minus the transport. Useful from tests and
/// from server code that wants to reuse its own procedures.
pub struct Caller<C> {
    router: Arc<FlatRouter<C>>,
    ctx: C,
    next_id: AtomicI64,
}

impl<C> Caller<C>
where
    C: Clone + Send + 'static,
{
    pub fn new(router: Arc<FlatRouter<C>>, ctx: C) -> Self {
        Self {
            router,
            ctx,
            next_id: AtomicI64::new(0),
        }
    }

    pub async fn call(&self, path: &str, input: Value) -> Result<Value, RpcError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = Request::new(id, path, input);
        dispatch(&self.router, request, self.ctx.clone())
            .await
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{Procedure, Router};
    use pcall_protocol::ErrorKind;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Clone)]
    struct Ctx {
        user: Option<String>,
    }

    fn app() -> FlatRouter<Ctx> {
        Router::new()
            .procedure(
                "ping",
                Procedure::new(|_input, _ctx| async { Ok(json!("pong")) }),
            )
            .procedure(
                "whoami",
                Procedure::new(|_input, ctx: Ctx| async move {
                    match ctx.user {
                        Some(user) => Ok(json!(user)),
                        None => Err(RpcError::new(ErrorKind::Unauthorized, "No token").into()),
                    }
                }),
            )
            .procedure(
                "slow",
                Procedure::new(|input, _ctx| async move {
                    let ms = input.as_u64().unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(input)
                }),
            )
            .procedure(
                "broken",
                Procedure::new(|_input, _ctx| async { Err(anyhow::anyhow!("disk on fire")) }),
            )
            .procedure(
                "panics",
                Procedure::new(|_input, _ctx| async { panic!("boom") }),
            )
            .flatten()
            .unwrap()
    }

    fn anon() -> Ctx {
        Ctx { user: None }
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let router = app();
        let response = dispatch(&router, Request::new(7i64, "ping", Value::Null), anon()).await;
        assert_eq!(response.id, RequestId::Number(7));
        assert_eq!(response.result(), Some(&json!("pong")));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_path() {
        let router = app();
        let response = dispatch(&router, Request::new(1i64, "users.nope", Value::Null), anon()).await;
        let err = response.error().unwrap();
        assert_eq!(err.status(), ErrorKind::NotFound);
        assert_eq!(err.code(), 404);
        assert!(err.message().contains("users.nope"));
    }

    #[tokio::test]
    async fn test_rpc_error_forwarded() {
        let router = app();
        let response = dispatch(&router, Request::new(1i64, "whoami", Value::Null), anon()).await;
        let err = response.error().unwrap();
        assert_eq!(err.status(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), "No token");

        let ctx = Ctx {
            user: Some("ada".into()),
        };
        let response = dispatch(&router, Request::new(2i64, "whoami", Value::Null), ctx).await;
        assert_eq!(response.result(), Some(&json!("ada")));
    }

    #[tokio::test]
    async fn test_other_error_becomes_internal() {
        let router = app();
        let response = dispatch(&router, Request::new(1i64, "broken", Value::Null), anon()).await;
        let err = response.error().unwrap();
        assert_eq!(err.status(), ErrorKind::InternalServerError);
        assert_eq!(err.message(), "disk on fire");
    }

    #[tokio::test]
    async fn test_panic_becomes_internal() {
        let router = app();
        let response = dispatch(&router, Request::new(1i64, "panics", Value::Null), anon()).await;
        let err = response.error().unwrap();
        assert_eq!(err.status(), ErrorKind::InternalServerError);
        assert_eq!(err.message(), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_preserves_order() {
        let router = app();
        let requests = vec![
            Request::new(0i64, "slow", json!(30)),
            Request::new(1i64, "missing", Value::Null),
            Request::new(2i64, "slow", json!(5)),
        ];

        let responses = dispatch_batch(&router, requests, anon()).await;
        let ids: Vec<_> = responses.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            ids,
            vec![RequestId::Number(0), RequestId::Number(1), RequestId::Number(2)]
        );
        assert_eq!(responses[0].result(), Some(&json!(30)));
        assert!(responses[1].is_error());
        assert_eq!(responses[2].result(), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_handle_keeps_shape() {
        let router = app();
        let single = Payload::decode(br#"{"id":1,"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert!(matches!(handle(&router, single, anon()).await, Reply::Single(_)));

        let batch = Payload::decode(br#"[{"id":1,"jsonrpc":"2.0","method":"ping"}]"#).unwrap();
        match handle(&router, batch, anon()).await {
            Reply::Batch(responses) => assert_eq!(responses.len(), 1),
            other => panic!("expected batch reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_caller() {
        let caller = Caller::new(
            Arc::new(app()),
            Ctx {
                user: Some("grace".into()),
            },
        );
        assert_eq!(caller.call("whoami", Value::Null).await.unwrap(), json!("grace"));
        assert_eq!(
            caller.call("nope", Value::Null).await.unwrap_err().status(),
            ErrorKind::NotFound
        );
    }
}
