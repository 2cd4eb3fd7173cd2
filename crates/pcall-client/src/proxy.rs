//! Dynamic call builder
//!
//! Each [`Proxy::get`] appends a path segment and returns a new builder;
//! nothing is sent until [`Proxy::call`].
//!
//! ```no_run
//! # async fn run(client: pcall_client::Client) -> pcall_client::Result<()> {
//! use serde_json::json;
//!
//! let user = client.api().get("users").get("getById").call(vec![json!({ "id": 1 })]).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::socket::SocketClient;
use pcall_protocol::{APPLY_SEGMENT, SOCKET_SEGMENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// What an invocation of an accumulated path means.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A remote procedure call.
    Call { method: String, params: Value },
    /// The socket sub-client.
    Socket,
}

/// Resolve an accumulated path and its invocation arguments.
///
/// `["$ws"]` addresses the socket sub-client. A trailing `apply` segment is
/// stripped and the second argument is taken as the real argument list.
/// The procedure input is the first argument, or `null`.
pub fn resolve(path: &[String], args: Vec<Value>) -> Result<Target> {
    if path.len() == 1 && path[0] == SOCKET_SEGMENT {
        return Ok(Target::Socket);
    }

    let (path, args) = match path.split_last() {
        Some((last, rest)) if last == APPLY_SEGMENT => (rest, apply_args(args)),
        _ => (path, args),
    };

    if path.is_empty() {
        return Err(ClientError::InvalidCall("empty procedure path".to_string()));
    }

    Ok(Target::Call {
        method: path.join("."),
        params: args.into_iter().next().unwrap_or(Value::Null),
    })
}

fn apply_args(args: Vec<Value>) -> Vec<Value> {
    match args.into_iter().nth(1) {
        Some(Value::Array(list)) => list,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

#[derive(Clone)]
pub struct Proxy {
    client: Client,
    path: Vec<String>,
}

impl Proxy {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            path: Vec::new(),
        }
    }

    pub fn get(&self, segment: impl Into<String>) -> Proxy {
        let mut path = self.path.clone();
        path.push(segment.into());
        Proxy {
            client: self.client.clone(),
            path,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.path
    }

    /// Dotted form of the accumulated path.
    pub fn path(&self) -> String {
        self.path.join(".")
    }

    /// Invoke the accumulated path with positional arguments.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        match resolve(&self.path, args)? {
            Target::Call { method, params } => self.client.call(&method, params).await,
            Target::Socket => Err(ClientError::InvalidCall(format!(
                "{} is the socket sub-client, use Proxy::socket",
                SOCKET_SEGMENT
            ))),
        }
    }

    /// Typed single-input call.
    pub async fn query<I, O>(&self, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)
            .map_err(|e| ClientError::InvalidCall(format!("input does not serialize: {}", e)))?;
        let output = self.call(vec![input]).await?;
        serde_json::from_value(output).map_err(|e| ClientError::InvalidReply(e.to_string()))
    }

    /// Socket sub-client, for the `$ws` path.
    pub fn socket(&self) -> Result<SocketClient> {
        match resolve(&self.path, Vec::new())? {
            Target::Socket => Ok(self.client.socket()),
            Target::Call { method, .. } => Err(ClientError::InvalidCall(format!(
                "{} is a procedure path, not the socket sub-client",
                method
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_call() {
        assert_eq!(
            resolve(&path(&["users", "getById"]), vec![json!({ "id": 1 }), json!("ignored")]).unwrap(),
            Target::Call {
                method: "users.getById".into(),
                params: json!({ "id": 1 })
            }
        );
    }

    #[test]
    fn test_no_args_is_null() {
        assert_eq!(
            resolve(&path(&["ping"]), vec![]).unwrap(),
            Target::Call {
                method: "ping".into(),
                params: Value::Null
            }
        );
    }

    #[test]
    fn test_apply_unwraps_argument_list() {
        assert_eq!(
            resolve(
                &path(&["users", "getById", "apply"]),
                vec![Value::Null, json!([{ "id": 7 }])]
            )
            .unwrap(),
            Target::Call {
                method: "users.getById".into(),
                params: json!({ "id": 7 })
            }
        );

        assert_eq!(
            resolve(&path(&["ping", "apply"]), vec![Value::Null]).unwrap(),
            Target::Call {
                method: "ping".into(),
                params: Value::Null
            }
        );
    }

    #[test]
    fn test_socket_path() {
        assert_eq!(resolve(&path(&["$ws"]), vec![]).unwrap(), Target::Socket);
        assert!(matches!(
            resolve(&path(&["$ws", "x"]), vec![]).unwrap(),
            Target::Call { .. }
        ));
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(resolve(&[], vec![]).is_err());
        assert!(resolve(&path(&["apply"]), vec![]).is_err());
    }
}
