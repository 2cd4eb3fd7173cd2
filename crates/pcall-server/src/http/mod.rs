//! axum adapter: the RPC POST route, the socket upgrade route and health

mod health;
mod rpc;
mod ws;

pub use rpc::{ContextFactory, ErrorHook};

pub(crate) use health::health_routes;
pub(crate) use rpc::{rpc_routes, RpcState};
pub(crate) use ws::ws_routes;
