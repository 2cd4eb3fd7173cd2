//! Host adapter: mounts the RPC endpoint and the socket layer on one axum app

use crate::error::Result;
use crate::http::{health_routes, rpc_routes, ws_routes, ContextFactory, ErrorHook, RpcState};
use crate::router::FlatRouter;
use crate::socket::Io;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::Router;
use pcall_config::ServerConfig;
use pcall_protocol::RpcError;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// RPC + socket server for a router with context type `C`.
pub struct RpcServer<C> {
    config: ServerConfig,
    router: Arc<FlatRouter<C>>,
    context: ContextFactory<C>,
    on_error: Option<ErrorHook>,
    io: Io,
}

impl<C> RpcServer<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// `context` builds the per-request context from the request headers.
    pub fn new<F>(config: ServerConfig, router: FlatRouter<C>, context: F) -> Self
    where
        F: Fn(&HeaderMap) -> C + Send + Sync + 'static,
    {
        let io = Io::with_pruning(config.prune_empty_channels);
        Self {
            config,
            router: Arc::new(router),
            context: Arc::new(context),
            on_error: None,
            io,
        }
    }

    /// Serve an existing socket layer instead of a fresh one.
    pub fn with_io(mut self, io: Io) -> Self {
        self.io = io;
        self
    }

    /// Observe every error the RPC endpoint returns.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RpcError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn io(&self) -> &Io {
        &self.io
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<FlatRouter<C>> {
        &self.router
    }

    /// Build the axum app: the RPC endpoint, the socket upgrade route and
    /// `/health`.
    pub fn into_router(self) -> Router {
        let state = RpcState {
            router: self.router,
            context: self.context,
            on_error: self.on_error,
        };

        let mut app = Router::new()
            .merge(rpc_routes(&self.config.endpoint, state))
            .merge(ws_routes(&self.config.ws_path, self.io.clone()))
            .merge(health_routes(self.io))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes()));

        if self.config.enable_cors {
            app = app.layer(cors_layer(&self.config.cors_origins));
        }
        app
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves, then
    /// close every socket connection.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let io = self.io.clone();
        let endpoint = self.config.endpoint.clone();
        let ws_path = self.config.ws_path.clone();
        let app = self.into_router();

        info!(
            addr = %listener.local_addr()?,
            %endpoint,
            %ws_path,
            "pcall server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        let closed = io.close_all().await;
        info!(closed, "pcall server stopped");
        Ok(())
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(%origin, "Ignoring invalid CORS origin");
                    None
                }
            }
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
