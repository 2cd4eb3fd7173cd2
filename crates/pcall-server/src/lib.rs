//! pcall server side
//!
//! - [`Router`] / [`Procedure`]: the procedure tree, flattened once into a
//!   dotted-path [`FlatRouter`]
//! - [`dispatch`]: request → response, with every failure mapped to an
//!   [`RpcError`](pcall_protocol::RpcError)
//! - [`socket`]: connection and channel registry for event pub/sub
//! - [`RpcServer`]: axum host adapter exposing both over HTTP and WebSocket
//!
//! ```no_run
//! use pcall_config::ServerConfig;
//! use pcall_server::{Procedure, Router, RpcServer};
//! use serde_json::json;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let router = Router::new()
//!     .procedure("ping", Procedure::new(|_input, _ctx: ()| async { Ok(json!("pong")) }))
//!     .flatten()?;
//!
//! RpcServer::new(ServerConfig::default(), router, |_headers| ())
//!     .serve(async { tokio::signal::ctrl_c().await.ok(); })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod demo;
pub mod dispatch;
mod error;
mod http;
pub mod router;
mod server;
pub mod socket;

pub use dispatch::{dispatch, dispatch_batch, handle, Caller};
pub use error::{Result, ServerError};
pub use http::{ContextFactory, ErrorHook};
pub use router::{FlatRouter, Procedure, Router, RouterError};
pub use server::RpcServer;
pub use socket::{ConnectionId, Io, Socket, SocketError};
