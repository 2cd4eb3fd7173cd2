//! Shared test harness: the demo server on an ephemeral port

#![allow(dead_code)]

use pcall_config::ServerConfig;
use pcall_server::demo::{self, ChatRoom, DemoContext};
use pcall_server::{Io, RpcServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestServer {
    pub addr: SocketAddr,
    pub io: Io,
    pub room: Arc<ChatRoom>,
    shutdown: CancellationToken,
    handle: JoinHandle<pcall_server::Result<()>>,
}

impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server = RpcServer::new(
            ServerConfig::default(),
            demo::router().flatten()?,
            DemoContext::from_headers,
        );
        let io = server.io().clone();
        let room = demo::install_chat(&io);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            server.serve_with_listener(listener, shutdown.clone().cancelled_owned()),
        );

        Ok(Self {
            addr,
            io,
            room,
            shutdown,
            handle,
        })
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}/rpc", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/rpc/ws", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        self.handle.await??;
        Ok(())
    }
}
