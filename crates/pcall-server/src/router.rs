//! Procedure tree and its flattened lookup table
//!
//! A [`Router`] is built once at startup from named procedures and nested
//! sub-routers. [`Router::flatten`] turns it into a [`FlatRouter`], an
//! immutable map from dotted path to procedure that dispatch reads without
//! walking the tree.

use futures::future::BoxFuture;
use pcall_protocol::{ErrorKind, RpcError, APPLY_SEGMENT, SOCKET_SEGMENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

pub type ProcedureFuture = BoxFuture<'static, anyhow::Result<Value>>;

type Handler<C> = dyn Fn(Value, C) -> ProcedureFuture + Send + Sync;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Duplicate procedure path: {0}")]
    DuplicatePath(String),

    #[error("Invalid path segment {segment:?} under {parent:?}")]
    InvalidSegment { parent: String, segment: String },

    #[error("Reserved path segment {0:?}")]
    ReservedSegment(String),
}

/// A named unit of server-side logic taking `(input, context)`.
///
/// Failures are `anyhow` errors. An [`RpcError`] anywhere in the returned
/// error is forwarded to the caller as-is; anything else becomes
/// `INTERNAL_SERVER_ERROR`.
pub struct Procedure<C> {
    handler: Arc<Handler<C>>,
}

impl<C> Clone for Procedure<C> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C: Send + 'static> Procedure<C> {
    /// Procedure over raw JSON input and output.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |input, ctx| Box::pin(f(input, ctx))),
        }
    }

    /// Procedure with typed input and output.
    ///
    /// Input that does not decode into `I` fails with `INPUT_PARSE_ERROR`;
    /// output that does not encode fails with `OUTPUT_PARSE_ERROR`.
    pub fn typed<I, O, F, Fut>(f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |input: Value, ctx: C| {
            let f = Arc::clone(&f);
            async move {
                let input: I = serde_json::from_value(input)
                    .map_err(|e| RpcError::new(ErrorKind::InputParseError, e.to_string()))?;
                let output = f(input, ctx).await?;
                let output = serde_json::to_value(output)
                    .map_err(|e| RpcError::new(ErrorKind::OutputParseError, e.to_string()))?;
                anyhow::Ok(output)
            }
        })
    }

    pub fn call(&self, input: Value, ctx: C) -> ProcedureFuture {
        (self.handler)(input, ctx)
    }
}

/// Interior or leaf of the procedure tree.
pub enum Node<C> {
    Procedure(Procedure<C>),
    Router(Router<C>),
}

/// Tree of procedures and named sub-routers.
///
/// ```
/// use pcall_server::{Procedure, Router};
/// use serde_json::json;
///
/// let users = Router::new().procedure(
///     "list",
///     Procedure::new(|_input, _ctx: ()| async { Ok(json!([])) }),
/// );
/// let app = Router::new()
///     .procedure("ping", Procedure::new(|_input, _ctx: ()| async { Ok(json!("pong")) }))
///     .nest("users", users);
///
/// let flat = app.flatten().unwrap();
/// assert!(flat.contains("users.list"));
/// ```
pub struct Router<C> {
    entries: Vec<(String, Node<C>)>,
}

impl<C> Default for Router<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C> Router<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn procedure(mut self, name: impl Into<String>, procedure: Procedure<C>) -> Self {
        self.entries
            .push((name.into(), Node::Procedure(procedure)));
        self
    }

    pub fn nest(mut self, name: impl Into<String>, router: Router<C>) -> Self {
        self.entries.push((name.into(), Node::Router(router)));
        self
    }

    /// Derive the dotted-path lookup table.
    ///
    /// Segments must be non-empty and free of `.`. `$ws` cannot name a
    /// top-level entry and `apply` cannot name a procedure, since the client
    /// proxy gives both a special meaning.
    pub fn flatten(&self) -> Result<FlatRouter<C>, RouterError> {
        let mut procedures = HashMap::new();
        flatten_into(&mut procedures, "", self)?;
        Ok(FlatRouter { procedures })
    }
}

fn flatten_into<C>(
    out: &mut HashMap<String, Procedure<C>>,
    prefix: &str,
    router: &Router<C>,
) -> Result<(), RouterError> {
    for (name, node) in &router.entries {
        if name.is_empty() || name.contains('.') {
            return Err(RouterError::InvalidSegment {
                parent: prefix.to_string(),
                segment: name.clone(),
            });
        }
        if prefix.is_empty() && name == SOCKET_SEGMENT {
            return Err(RouterError::ReservedSegment(name.clone()));
        }

        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };

        match node {
            Node::Procedure(procedure) => {
                if name == APPLY_SEGMENT {
                    return Err(RouterError::ReservedSegment(path));
                }
                if out.insert(path.clone(), procedure.clone()).is_some() {
                    return Err(RouterError::DuplicatePath(path));
                }
            }
            Node::Router(child) => flatten_into(out, &path, child)?,
        }
    }
    Ok(())
}

/// Immutable dotted-path → procedure table, shared freely across requests.
pub struct FlatRouter<C> {
    procedures: HashMap<String, Procedure<C>>,
}

impl<C> FlatRouter<C> {
    pub fn get(&self, path: &str) -> Option<&Procedure<C>> {
        self.procedures.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.procedures.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// All paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.procedures.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}
