//! Request batching
//!
//! [`BatchScheduler`] coalesces calls into one window per scheduler. A window
//! is sent when it reaches `max` calls or when its timer fires, whichever
//! comes first. Reaching `max` cancels the timer, and every window carries a
//! generation number so a timer that already fired for an earlier window
//! cannot flush a later one.

use crate::error::{ClientError, Result};
use crate::transport::Transport;
use pcall_config::BatchConfig;
use pcall_protocol::{Request, RequestId, Response};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Reply = oneshot::Sender<Result<Value>>;

struct Pending {
    request: Request,
    reply: Reply,
}

#[derive(Default)]
struct Window {
    next_id: i64,
    pending: Vec<Pending>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl Window {
    /// Take the queued calls and start a new window.
    fn take(&mut self) -> Vec<Pending> {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        std::mem::take(&mut self.pending)
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: BatchConfig,
    window: Mutex<Window>,
}

/// Result of [`BatchScheduler::add_request`]; resolves once the batch that
/// carries the call has been answered.
pub struct PendingCall {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingCall {
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ClientError::Canceled)))
    }
}

#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<Inner>,
}

impl BatchScheduler {
    pub fn new(transport: Arc<dyn Transport>, config: BatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                window: Mutex::new(Window::default()),
            }),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Queue a call. Must be called from within a tokio runtime.
    ///
    /// Ids are allocated from 0 and never reused by this scheduler.
    pub fn add_request(&self, method: impl Into<String>, params: Value) -> PendingCall {
        let (tx, rx) = oneshot::channel();
        let mut window = self.inner.window.lock();

        let id = RequestId::Number(window.next_id);
        window.next_id += 1;
        window.pending.push(Pending {
            request: Request::new(id.clone(), method, params),
            reply: tx,
        });

        if window.pending.len() >= self.inner.config.max {
            let batch = window.take();
            drop(window);
            tokio::spawn(send(Arc::clone(&self.inner.transport), batch));
        } else if window.timer.is_none() {
            let generation = window.generation;
            let inner = Arc::clone(&self.inner);
            window.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(inner.config.timeout()).await;
                flush_generation(&inner, generation).await;
            }));
        }

        PendingCall { id, rx }
    }

    /// Send whatever is queued now and wait for its replies to be delivered.
    pub async fn flush(&self) {
        let batch = self.inner.window.lock().take();
        send(Arc::clone(&self.inner.transport), batch).await;
    }

    /// Calls queued in the current window.
    pub fn queued(&self) -> usize {
        self.inner.window.lock().pending.len()
    }

    #[cfg(test)]
    fn has_scheduled_flush(&self) -> bool {
        self.inner.window.lock().timer.is_some()
    }
}

async fn flush_generation(inner: &Inner, generation: u64) {
    let batch = {
        let mut window = inner.window.lock();
        if window.generation != generation {
            debug!(generation, "Stale batch timer");
            return;
        }
        // The timer being fired is this task; drop its handle without
        // aborting it.
        window.timer = None;
        window.take()
    };
    send(Arc::clone(&inner.transport), batch).await;
}

async fn send(transport: Arc<dyn Transport>, batch: Vec<Pending>) {
    if batch.is_empty() {
        return;
    }

    let mut waiting: HashMap<RequestId, Reply> = HashMap::with_capacity(batch.len());
    let requests: Vec<Request> = batch
        .into_iter()
        .map(|pending| {
            waiting.insert(pending.request.id.clone(), pending.reply);
            pending.request
        })
        .collect();
    debug!(size = requests.len(), "Sending batch");

    match transport.call_batch(requests).await {
        Ok(responses) => deliver(&mut waiting, responses),
        Err(err) => {
            warn!(error = %err, size = waiting.len(), "Batch failed");
            for (_, reply) in waiting.drain() {
                let _ = reply.send(Err(err.clone()));
            }
        }
    }

    for (id, reply) in waiting {
        warn!(%id, "Batch reply has no entry for request");
        let _ = reply.send(Err(ClientError::MissingResponse(id)));
    }
}

fn deliver(waiting: &mut HashMap<RequestId, Reply>, responses: Vec<Response>) {
    for response in responses {
        match waiting.remove(&response.id) {
            Some(reply) => {
                let _ = reply.send(response.into_result().map_err(ClientError::from));
            }
            None => warn!(id = %response.id, "Reply for unknown request id"),
        }
    }
}
