//! pcall client
//!
//! A [`Client`] talks to one endpoint over a link chosen by
//! [`LinkMode`](pcall_config::LinkMode): linear (one HTTP round-trip per call)
//! or batch (calls coalesced by a [`BatchScheduler`]). [`Client::api`] gives a
//! dynamic [`Proxy`] that builds dotted procedure paths; the reserved `$ws`
//! path yields a [`SocketClient`] for event pub/sub.
//!
//! ```no_run
//! use pcall_client::Client;
//! use pcall_config::{BatchConfig, LinkMode};
//! use serde_json::json;
//!
//! # async fn run() -> pcall_client::Result<()> {
//! let client = Client::new("http://127.0.0.1:8000/rpc", LinkMode::Batch(BatchConfig::default()))?;
//! let pong = client.api().get("ping").call(vec![]).await?;
//! assert_eq!(pong, json!("pong"));
//!
//! let socket = client.api().get("$ws").socket()?;
//! socket.on("message:receive", |args| println!("{:?}", args));
//! socket.open().await?;
//! socket.emit("chat:join", &[json!("ada")])?;
//! # Ok(())
//! # }
//! ```

mod batch;
mod client;
mod error;
mod link;
mod proxy;
mod socket;
mod transport;

pub use batch::{BatchScheduler, PendingCall};
pub use client::Client;
pub use error::{ClientError, Result};
pub use link::{LinearLink, Link};
pub use proxy::{resolve, Proxy, Target};
pub use socket::{socket_url, SocketClient, CONNECT_EVENT, DISCONNECT_EVENT};
pub use transport::{HttpTransport, Transport};
