//! Sample procedures and an in-memory chat room, served by the
//! `pcall-server` binary.

use crate::router::{Procedure, Router};
use crate::socket::{ConnectionId, Io, Socket};
use anyhow::{anyhow, Context as _};
use axum::http::HeaderMap;
use parking_lot::Mutex;
use pcall_protocol::{ErrorKind, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Header the demo context reads its token from.
pub const TOKEN_HEADER: &str = "x-token";

/// Channel every chat participant joins.
pub const CHAT_CHANNEL: &str = "chat";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemoContext {
    pub token: Option<String>,
}

impl DemoContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            token: headers
                .get(TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct GetById {
    id: u64,
}

fn users() -> Vec<User> {
    [(1, "Ada"), (2, "Grace"), (3, "Linus")]
        .into_iter()
        .map(|(id, name)| User {
            id,
            name: name.to_string(),
        })
        .collect()
}

/// `ping`, `echo`, `users.list`, `users.getById` and `users.me`.
pub fn router() -> Router<DemoContext> {
    let users_router = Router::new()
        .procedure(
            "list",
            Procedure::typed(|_input: Value, _ctx: DemoContext| async { Ok(users()) }),
        )
        .procedure(
            "getById",
            Procedure::typed(|input: GetById, _ctx: DemoContext| async move {
                users()
                    .into_iter()
                    .find(|user| user.id == input.id)
                    .ok_or_else(|| RpcError::not_found(format!("No user with id {}", input.id)).into())
            }),
        )
        .procedure(
            "me",
            Procedure::new(|_input, ctx: DemoContext| async move {
                match ctx.token {
                    Some(token) => Ok(json!({ "token": token })),
                    None => Err(RpcError::new(ErrorKind::Unauthorized, "Missing token").into()),
                }
            }),
        );

    Router::new()
        .procedure(
            "ping",
            Procedure::new(|_input, _ctx: DemoContext| async { Ok(json!("pong")) }),
        )
        .procedure(
            "echo",
            Procedure::new(|input, _ctx: DemoContext| async move { Ok(input) }),
        )
        .nest("users", users_router)
}

#[derive(Default)]
struct ChatState {
    participants: HashMap<ConnectionId, String>,
    messages: Vec<Value>,
}

/// Participants and message history for the chat demo. Nothing is persisted.
#[derive(Default)]
pub struct ChatRoom {
    state: Mutex<ChatState>,
}

impl ChatRoom {
    /// User ids currently in the room, sorted.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<_> = self.state.lock().participants.values().cloned().collect();
        users.sort_unstable();
        users.dedup();
        users
    }

    pub fn messages(&self) -> Vec<Value> {
        self.state.lock().messages.clone()
    }

    fn enter(&self, connection: ConnectionId, user: String) {
        self.state.lock().participants.insert(connection, user);
    }

    fn exit(&self, connection: ConnectionId) -> Option<String> {
        self.state.lock().participants.remove(&connection)
    }

    fn post(&self, message: Value) {
        self.state.lock().messages.push(message);
    }
}

/// Create the chat channel and wire the chat events onto every new
/// connection of `io`.
pub fn install_chat(io: &Io) -> Arc<ChatRoom> {
    let room = Arc::new(ChatRoom::default());
    io.add_channel(CHAT_CHANNEL, json!({ "name": "chat" }));

    let shared = Arc::clone(&room);
    io.on_connection(move |socket| {
        let room = Arc::clone(&shared);
        async move { register_chat(&socket, room) }
    });
    room
}

fn user_arg(args: &[Value]) -> anyhow::Result<String> {
    args.first()
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("expected a user id string as first argument"))
}

fn register_chat(socket: &Socket, room: Arc<ChatRoom>) -> anyhow::Result<()> {
    let (s, r) = (socket.clone(), Arc::clone(&room));
    socket.on("chat:join", move |args| {
        let (socket, room) = (s.clone(), Arc::clone(&r));
        async move {
            let user = user_arg(&args)?;
            socket.join(CHAT_CHANNEL)?;
            room.enter(socket.id(), user.clone());
            debug!(connection = %socket.id(), %user, "Joined chat");

            socket.emit(
                "chat:joined",
                &[json!({
                    "userId": user,
                    "users": room.users(),
                    "messages": room.messages(),
                })],
            )?;
            socket.broadcast(
                CHAT_CHANNEL,
                "chat:join",
                &[json!({ "userId": user, "users": room.users() })],
            )?;
            anyhow::Ok(())
        }
    })?;

    let (s, r) = (socket.clone(), Arc::clone(&room));
    socket.on("chat:leave", move |args| {
        let (socket, room) = (s.clone(), Arc::clone(&r));
        async move {
            let user = user_arg(&args)?;
            socket.io().broadcast(
                CHAT_CHANNEL,
                "chat:leave",
                &[json!({ "userId": user })],
                None,
            )?;
            socket.leave(CHAT_CHANNEL);
            room.exit(socket.id());
            anyhow::Ok(())
        }
    })?;

    let (s, r) = (socket.clone(), Arc::clone(&room));
    socket.on("message:send", move |args| {
        let (socket, room) = (s.clone(), Arc::clone(&r));
        async move {
            let message = args
                .into_iter()
                .next()
                .context("message:send without a message")?;
            room.post(message.clone());
            socket.broadcast(CHAT_CHANNEL, "message:receive", &[message])?;
            anyhow::Ok(())
        }
    })?;

    let s = socket.clone();
    socket.on(crate::socket::DISCONNECT_EVENT, move |_args| {
        let (socket, room) = (s.clone(), Arc::clone(&room));
        async move {
            if let Some(user) = room.exit(socket.id()) {
                socket.broadcast(
                    CHAT_CHANNEL,
                    "chat:leave",
                    &[json!({ "userId": user })],
                )?;
            }
            socket.leave(CHAT_CHANNEL);
            anyhow::Ok(())
        }
    })?;

    Ok(())
}
