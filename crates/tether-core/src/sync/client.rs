// ── Surface side of the sync protocol ──
//
// A surface keeps a read-only mirror of the core's state. The mirror is
// seeded by the first `initialState` and advanced by replaying each
// `commit` through the mirror's own handlers. Commands become
// id-correlated request/reply round trips.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::protocol::{CommandRequest, CoreEvent, SurfaceEnd, SurfaceEvent};
use crate::error::{StoreError, SyncError};
use crate::store::{MutationRecord, Store, Subscription};
use crate::stream::StateStream;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type PendingReply = oneshot::Sender<Result<Value, SyncError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Connecting,
    Ready,
    Closed,
}

struct SurfaceInner {
    mirror: Store,
    outbound: Mutex<Option<mpsc::UnboundedSender<SurfaceEvent>>>,
    pending: DashMap<u64, PendingReply>,
    next_id: AtomicU64,
    status: watch::Sender<Status>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SurfaceInner {
    fn sender(&self) -> Option<mpsc::UnboundedSender<SurfaceEvent>> {
        lock(&self.outbound).clone()
    }

    fn handle(&self, event: CoreEvent) {
        match event {
            CoreEvent::InitialState(state) => {
                if *self.status.borrow() != Status::Connecting {
                    debug!("ignoring repeated initial state");
                    return;
                }
                match self.mirror.replace_state(Value::clone(&state)) {
                    Ok(()) => {
                        self.status.send_replace(Status::Ready);
                        debug!("mirror seeded from initial state");
                    }
                    Err(e) => error!(error = %e, "initial state rejected by mirror"),
                }
            }
            CoreEvent::Commit(MutationRecord { kind, payload }) => {
                if let Err(e) = self.mirror.commit(&kind, payload) {
                    error!(kind = %kind, error = %e, "failed to replay mutation");
                }
            }
            CoreEvent::Reply(reply) => match self.pending.remove(&reply.id) {
                Some((_, tx)) => {
                    let _ = tx.send(reply.into_result());
                }
                None => warn!(id = reply.id, "reply for unknown request"),
            },
        }
    }

    fn fail_pending(&self) {
        self.status.send_replace(Status::Closed);
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(SyncError::Disconnected));
            }
        }
    }
}

/// Front-end end of a connection: a read-only state mirror plus a
/// command dispatcher.
///
/// Cheaply cloneable; clones share the connection.
#[derive(Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl Surface {
    /// Start the receive loop on `end` and send `connect`.
    ///
    /// `mirror` must register the same mutations as the core's store so
    /// deltas replay identically. Its actions are never run.
    pub fn connect(mirror: Store, end: SurfaceEnd) -> Result<Self, SyncError> {
        let (outbound, inbound) = end.split();
        let (status, _) = watch::channel(Status::Connecting);

        let inner = Arc::new(SurfaceInner {
            mirror,
            outbound: Mutex::new(Some(outbound)),
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            status,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        });

        let task = tokio::spawn(receive_task(Arc::clone(&inner), inbound));
        *lock(&inner.task) = Some(task);

        let sent = inner
            .sender()
            .is_some_and(|tx| tx.send(SurfaceEvent::Connect).is_ok());
        if !sent {
            return Err(SyncError::Disconnected);
        }
        Ok(Self { inner })
    }

    /// Wait until the mirror holds the core's initial state.
    pub async fn ready(&self) -> Result<(), SyncError> {
        let mut rx = self.inner.status.subscribe();
        let status = rx
            .wait_for(|s| *s != Status::Connecting)
            .await
            .map(|s| *s)
            .map_err(|_| SyncError::Disconnected)?;
        match status {
            Status::Ready => Ok(()),
            Status::Connecting | Status::Closed => Err(SyncError::Disconnected),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.status.borrow() == Status::Ready
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Run a command on the core and await its single reply.
    pub async fn dispatch(&self, kind: &str, payload: Value) -> Result<Value, SyncError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);

        if *self.inner.status.borrow() == Status::Closed {
            self.inner.pending.remove(&id);
            return Err(SyncError::Disconnected);
        }

        let request = SurfaceEvent::Dispatch(CommandRequest {
            id,
            kind: kind.to_owned(),
            payload,
        });
        let sent = self
            .inner
            .sender()
            .is_some_and(|out| out.send(request).is_ok());
        if !sent {
            self.inner.pending.remove(&id);
            return Err(SyncError::Disconnected);
        }

        debug!(id, kind, "command sent");
        rx.await.map_err(|_| SyncError::Disconnected)?
    }

    /// Dispatch a single object carrying its own `type` field; the rest
    /// of the object becomes the payload.
    pub async fn dispatch_object(&self, command: Value) -> Result<Value, SyncError> {
        let Value::Object(mut fields) = command else {
            return Err(SyncError::MissingType);
        };
        let Some(Value::String(kind)) = fields.remove("type") else {
            return Err(SyncError::MissingType);
        };
        self.dispatch(&kind, Value::Object(fields)).await
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    // ── Mirror reads ─────────────────────────────────────────────

    pub fn state(&self) -> Arc<Value> {
        self.inner.mirror.state()
    }

    pub fn module_state<S: DeserializeOwned>(&self, module: &str) -> Result<S, StoreError> {
        self.inner.mirror.module_state(module)
    }

    pub fn stream(&self) -> StateStream {
        self.inner.mirror.stream()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MutationRecord, &Arc<Value>) + Send + Sync + 'static,
    {
        self.inner.mirror.subscribe(callback)
    }

    pub fn watch<Sel, F>(&self, selector: Sel, callback: F) -> Subscription
    where
        Sel: Fn(&Value) -> Value + Send + Sync + 'static,
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.inner.mirror.watch(selector, callback)
    }

    pub fn watch_pointer<F>(&self, pointer: &str, callback: F) -> Subscription
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.inner.mirror.watch_pointer(pointer, callback)
    }

    /// Close the channel. Pending commands fail with `Disconnected`.
    pub async fn close(&self) {
        lock(&self.inner.outbound).take();
        self.inner.cancel.cancel();
        let task = lock(&self.inner.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "surface receive task failed");
            }
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("status", &*self.inner.status.borrow())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

async fn receive_task(inner: Arc<SurfaceInner>, mut inbound: mpsc::UnboundedReceiver<CoreEvent>) {
    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            event = inbound.recv() => {
                let Some(event) = event else { break };
                inner.handle(event);
            }
        }
    }
    inner.fail_pending();
    debug!("surface receive loop stopped");
}
