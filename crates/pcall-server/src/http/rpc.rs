//! RPC endpoint
//!
//! Accepts one request object or an array of them. A single reply carries
//! the error's code as HTTP status; a batch reply is always 200 with each
//! entry carrying its own error. A body that does not decode is answered with
//! the bare `PARSE_ERROR` object and status 418; one over the size limit with
//! a bare `PAYLOAD_TOO_LARGE` and status 413.

use crate::dispatch::{dispatch, dispatch_batch};
use crate::router::FlatRouter;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use pcall_protocol::{ErrorKind, Payload, RpcError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the per-request context from the incoming headers.
pub type ContextFactory<C> = Arc<dyn Fn(&HeaderMap) -> C + Send + Sync>;

/// Observer called with every error the endpoint sends back.
pub type ErrorHook = Arc<dyn Fn(&RpcError) + Send + Sync>;

pub(crate) struct RpcState<C> {
    pub router: Arc<FlatRouter<C>>,
    pub context: ContextFactory<C>,
    pub on_error: Option<ErrorHook>,
}

impl<C> Clone for RpcState<C> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            context: Arc::clone(&self.context),
            on_error: self.on_error.clone(),
        }
    }
}

impl<C> RpcState<C> {
    fn report(&self, err: &RpcError) {
        if let Some(hook) = &self.on_error {
            hook(err);
        }
    }
}

pub(crate) fn rpc_routes<C>(endpoint: &str, state: RpcState<C>) -> Router
where
    C: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(endpoint, post(rpc_handler::<C>))
        .with_state(state)
}

fn status_for(err: &RpcError) -> StatusCode {
    StatusCode::from_u16(err.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn body_error(rejection: &BytesRejection) -> RpcError {
    let kind = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorKind::PayloadTooLarge
    } else {
        ErrorKind::BadRequest
    };
    RpcError::new(kind, rejection.body_text())
}

async fn rpc_handler<C>(
    State(state): State<RpcState<C>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response
where
    C: Clone + Send + Sync + 'static,
{
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let err = body_error(&rejection);
            warn!(error = %err, "Rejected RPC body");
            state.report(&err);
            return (status_for(&err), Json(err)).into_response();
        }
    };

    let payload = match Payload::decode(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "Rejected undecodable RPC body");
            state.report(&err);
            return (status_for(&err), Json(err)).into_response();
        }
    };

    let ctx = (state.context)(&headers);

    match payload {
        Payload::Single(request) => {
            let response = dispatch(&state.router, request, ctx).await;
            let status = match response.error() {
                Some(err) => {
                    state.report(err);
                    status_for(err)
                }
                None => StatusCode::OK,
            };
            (status, Json(response)).into_response()
        }
        Payload::Batch(requests) => {
            debug!(size = requests.len(), "Dispatching batch");
            let responses = dispatch_batch(&state.router, requests, ctx).await;
            for err in responses.iter().filter_map(|r| r.error()) {
                state.report(err);
            }
            (StatusCode::OK, Json(responses)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{Procedure, Router as ProcedureRouter};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use axum::extract::DefaultBodyLimit;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(errors: Arc<Mutex<Vec<ErrorKind>>>) -> Router {
        let router = ProcedureRouter::new()
            .procedure(
                "whoami",
                Procedure::new(|_input, ctx: Option<String>| async move {
                    match ctx {
                        Some(token) => Ok(json!(token)),
                        None => Err(RpcError::new(ErrorKind::Unauthorized, "Missing token").into()),
                    }
                }),
            )
            .flatten()
            .unwrap();

        rpc_routes(
            "/rpc",
            RpcState {
                router: Arc::new(router),
                context: Arc::new(|headers: &HeaderMap| {
                    headers
                        .get("x-token")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                }),
                on_error: Some(Arc::new(move |err: &RpcError| errors.lock().push(err.status()))),
            },
        )
    }

    async fn post(app: Router, body: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/rpc")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header("x-token", token);
        }
        let response = app
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_context_from_headers() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (status, body) = post(
            app(errors.clone()),
            r#"{"id":1,"jsonrpc":"2.0","method":"whoami"}"#,
            Some("t0k"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!("t0k"));
        assert!(errors.lock().is_empty());
    }

    #[tokio::test]
    async fn test_single_error_sets_status() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (status, body) = post(
            app(errors.clone()),
            r#"{"id":1,"jsonrpc":"2.0","method":"whoami"}"#,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["status"], json!("UNAUTHORIZED"));
        assert_eq!(body["error"]["code"], json!(401));
        assert_eq!(*errors.lock(), vec![ErrorKind::Unauthorized]);
    }

    #[tokio::test]
    async fn test_batch_is_always_ok() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (status, body) = post(
            app(errors.clone()),
            r#"[{"id":0,"jsonrpc":"2.0","method":"whoami"},{"id":1,"jsonrpc":"2.0","method":"missing"}]"#,
            Some("abc"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["result"], json!("abc"));
        assert_eq!(body[1]["error"]["code"], json!(404));
        assert_eq!(*errors.lock(), vec![ErrorKind::NotFound]);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (status, body) = post(app(errors.clone()), "{not json", None).await;
        assert_eq!(status.as_u16(), 418);
        assert_eq!(body["status"], json!("PARSE_ERROR"));
        assert!(body.get("id").is_none());
        assert_eq!(*errors.lock(), vec![ErrorKind::ParseError]);
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let app = app(errors.clone()).layer(DefaultBodyLimit::max(16));
        let (status, body) = post(
            app,
            r#"{"id":1,"jsonrpc":"2.0","method":"whoami","params":"padding"}"#,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["status"], json!("PAYLOAD_TOO_LARGE"));
        assert_eq!(body["code"], json!(413));
        assert_eq!(*errors.lock(), vec![ErrorKind::PayloadTooLarge]);
    }
}
