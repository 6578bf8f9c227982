// ── Privileged side of the sync protocol ──
//
// Every accepted channel becomes a connection in the registry with its
// own receive task, delta forwarder and state. Dispatch requests run on
// their own tasks so a slow command never blocks the connection; those
// tasks are kept so shutdown can let them settle.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::protocol::{CommandReply, CommandRequest, CoreEnd, CoreEvent, SurfaceEvent};
use crate::model::ErrorObject;
use crate::store::{Store, Subscription};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── ConnectionId ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── ConnectionState ──────────────────────────────────────────────

/// Lifecycle of one connection as seen by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted but no `connect` received yet, or closed.
    Disconnected,
    /// `initialState` sent and deltas are being forwarded.
    Connected,
}

struct ConnectionSlot {
    outbound: mpsc::UnboundedSender<CoreEvent>,
    forwarder: Option<Subscription>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

// ── SyncServer ───────────────────────────────────────────────────

struct ServerInner {
    store: Store,
    connections: DashMap<ConnectionId, ConnectionSlot>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    commands: Mutex<Vec<JoinHandle<()>>>,
}

/// Serves any number of surface connections against one store.
///
/// Cheaply cloneable via `Arc<ServerInner>`.
#[derive(Clone)]
pub struct SyncServer {
    inner: Arc<ServerInner>,
}

impl SyncServer {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                store,
                connections: DashMap::new(),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                commands: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Register a channel and start serving it. The connection stays
    /// `Disconnected` until the surface sends `connect`.
    pub fn accept(&self, end: CoreEnd) -> ConnectionHandle {
        let id = ConnectionId::new();
        let (outbound, inbound) = end.split();
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = self.inner.cancel.child_token();

        self.inner.connections.insert(
            id,
            ConnectionSlot {
                outbound,
                forwarder: None,
                state,
                cancel: cancel.clone(),
            },
        );

        let handle = tokio::spawn(connection_task(self.clone(), id, inbound, cancel));
        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
        debug!(%id, "connection accepted");

        ConnectionHandle {
            id,
            state: state_rx,
            server: self.clone(),
        }
    }

    /// Drop a connection: stop forwarding and mark it closed.
    /// Unknown or already closed ids are ignored.
    pub fn disconnect(&self, id: ConnectionId) {
        let Some((_, slot)) = self.inner.connections.remove(&id) else {
            return;
        };
        slot.cancel.cancel();
        if let Some(forwarder) = slot.forwarder {
            forwarder.unsubscribe();
        }
        slot.state.send_replace(ConnectionState::Disconnected);
        info!(%id, "surface disconnected");
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.inner
            .connections
            .get(&id)
            .is_some_and(|slot| *slot.state.borrow() == ConnectionState::Connected)
    }

    /// Close every connection, wait for their receive tasks, then wait
    /// for commands already in flight. Those are never cancelled, so
    /// their commits land before this returns.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<_> = lock(&self.inner.tasks).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "connection task failed");
            }
        }

        // Receive tasks are gone, so no new command can be spawned.
        let commands: Vec<_> = lock(&self.inner.commands).drain(..).collect();
        if !commands.is_empty() {
            debug!(count = commands.len(), "waiting for in-flight commands");
        }
        for handle in commands {
            if let Err(e) = handle.await {
                error!(error = %e, "command task failed");
            }
        }

        let remaining: Vec<ConnectionId> =
            self.inner.connections.iter().map(|entry| *entry.key()).collect();
        for id in remaining {
            self.disconnect(id);
        }
        debug!("sync server stopped");
    }

    // ── Event handlers ───────────────────────────────────────────

    fn on_connect(&self, id: ConnectionId) {
        let Some(mut slot) = self.inner.connections.get_mut(&id) else {
            return;
        };

        if let Some(previous) = slot.forwarder.take() {
            previous.unsubscribe();
            debug!(%id, "replaced previous forwarder");
        }

        let initial = slot.outbound.clone();
        let deltas = slot.outbound.clone();
        let forwarder = self.inner.store.subscribe_with_snapshot(
            move |state| {
                let _ = initial.send(CoreEvent::InitialState(state));
            },
            move |record, _| {
                let _ = deltas.send(CoreEvent::Commit(record.clone()));
            },
        );

        slot.forwarder = Some(forwarder);
        slot.state.send_replace(ConnectionState::Connected);
        info!(%id, "surface connected");
    }

    fn on_dispatch(&self, id: ConnectionId, request: CommandRequest) {
        let Some(outbound) = self
            .inner
            .connections
            .get(&id)
            .map(|slot| slot.outbound.clone())
        else {
            return;
        };
        let store = self.inner.store.clone();

        let handle = tokio::spawn(async move {
            let CommandRequest {
                id: request_id,
                kind,
                payload,
            } = request;

            // The inner task isolates panics so a reply is always sent.
            let command = kind.clone();
            let run = tokio::spawn(async move { store.dispatch(&command, payload).await });

            let reply = match run.await {
                Ok(Ok(value)) => CommandReply::ok(request_id, value),
                Ok(Err(e)) => {
                    debug!(kind = %kind, error = %e, "command failed");
                    CommandReply::err(request_id, e.to_error_object())
                }
                Err(e) => {
                    error!(kind = %kind, error = %e, "command task aborted");
                    CommandReply::err(
                        request_id,
                        ErrorObject::unknown(format!("Command {kind} failed: {e}")),
                    )
                }
            };

            if outbound.send(CoreEvent::Reply(reply)).is_err() {
                debug!(request_id, "reply dropped, connection closed");
            }
        });

        let mut commands = lock(&self.inner.commands);
        commands.retain(|t| !t.is_finished());
        commands.push(handle);
    }

    /// Commands whose task has not finished yet.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.commands)
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }
}

impl fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncServer")
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

async fn connection_task(
    server: SyncServer,
    id: ConnectionId,
    mut inbound: mpsc::UnboundedReceiver<SurfaceEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = inbound.recv() => {
                let Some(event) = event else { break };
                match event {
                    SurfaceEvent::Connect => server.on_connect(id),
                    SurfaceEvent::Dispatch(request) => server.on_dispatch(id, request),
                }
            }
        }
    }
    server.disconnect(id);
}

// ── ConnectionHandle ─────────────────────────────────────────────

/// Core-side handle to one accepted connection.
pub struct ConnectionHandle {
    id: ConnectionId,
    state: watch::Receiver<ConnectionState>,
    server: SyncServer,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `target`.
    /// Returns `false` if the connection was dropped first.
    pub async fn wait_for(&mut self, target: ConnectionState) -> bool {
        self.state.wait_for(|s| *s == target).await.is_ok()
    }

    pub fn close(&self) {
        self.server.disconnect(self.id);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;
    use crate::error::StoreError;
    use crate::store::Module;
    use crate::sync::protocol::channel;

    fn store() -> Store {
        Store::builder()
            .module(
                Module::new("doc", json!({"title": ""}))
                    .mutation("SET", |state, payload| {
                        state["title"] = payload;
                        Ok(())
                    })
                    .action("set", |ctx, payload| async move {
                        ctx.commit("SET", payload.clone())?;
                        Ok::<_, StoreError>(payload)
                    })
                    .action("slow", |ctx, payload| async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        ctx.commit("SET", payload)?;
                        Ok::<_, StoreError>(Value::Null)
                    })
                    .action("fail", |_, _| async {
                        Err::<Value, _>(StoreError::CommandFailed {
                            message: "nope".into(),
                        })
                    })
                    .action("panic", |_, _| async {
                        if true {
                            panic!("boom");
                        }
                        Ok::<_, StoreError>(Value::Null)
                    }),
            )
            .build()
            .unwrap()
    }

    fn request(id: u64, kind: &str, payload: Value) -> SurfaceEvent {
        SurfaceEvent::Dispatch(CommandRequest {
            id,
            kind: kind.into(),
            payload,
        })
    }

    #[tokio::test]
    async fn connect_sends_initial_state_before_deltas() {
        let server = SyncServer::new(store());
        let (core, mut surface) = channel();
        let mut handle = server.accept(core);

        surface.send(SurfaceEvent::Connect);
        assert!(handle.wait_for(ConnectionState::Connected).await);

        server.store().commit("doc/SET", json!("a")).unwrap();

        let first = surface.recv().await.unwrap();
        assert!(matches!(first, CoreEvent::InitialState(ref s) if s["doc"]["title"] == json!("")));
        let second = surface.recv().await.unwrap();
        assert_eq!(
            second,
            CoreEvent::Commit(crate::store::MutationRecord::new("doc/SET", json!("a")))
        );
    }

    #[tokio::test]
    async fn reconnect_replaces_forwarder() {
        let server = SyncServer::new(store());
        let (core, mut surface) = channel();
        let mut handle = server.accept(core);

        surface.send(SurfaceEvent::Connect);
        assert!(handle.wait_for(ConnectionState::Connected).await);
        let subscribers = server.store().subscriber_count();

        surface.send(SurfaceEvent::Connect);
        surface.send(request(1, "doc/set", json!("x")));
        // The reply proves both events were processed.
        loop {
            if let CoreEvent::Reply(_) = surface.recv().await.unwrap() {
                break;
            }
        }
        assert_eq!(server.store().subscriber_count(), subscribers);
    }

    #[tokio::test]
    async fn dispatch_replies_with_value_error_and_panic() {
        let server = SyncServer::new(store());
        let (core, mut surface) = channel();
        server.accept(core);

        surface.send(request(1, "doc/set", json!("t")));
        surface.send(request(2, "doc/fail", Value::Null));
        surface.send(request(3, "doc/panic", Value::Null));
        surface.send(request(4, "doc/missing", Value::Null));

        let mut replies = Vec::new();
        while replies.len() < 4 {
            if let CoreEvent::Reply(reply) = surface.recv().await.unwrap() {
                replies.push(reply);
            }
        }
        replies.sort_by_key(|r| r.id);

        assert_eq!(replies[0], CommandReply::ok(1, json!("t")));
        assert_eq!(replies[1].error.as_ref().unwrap().message(), "Command failed: nope");
        assert_eq!(replies[2].error.as_ref().unwrap().code(), "error/unknown");
        assert_eq!(
            replies[3].error.as_ref().unwrap().message(),
            "Unknown command type: doc/missing"
        );
    }

    #[tokio::test]
    async fn closing_the_channel_disconnects() {
        let server = SyncServer::new(store());
        let (core, surface) = channel();
        let mut handle = server.accept(core);
        surface.send(SurfaceEvent::Connect);
        assert!(handle.wait_for(ConnectionState::Connected).await);
        assert!(server.is_connected(handle.id()));

        drop(surface);
        assert!(handle.wait_for(ConnectionState::Disconnected).await);
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.store().subscriber_count(), 0);

        // Idempotent.
        handle.close();
        server.disconnect(handle.id());
    }

    #[tokio::test]
    async fn connections_are_independent() {
        let server = SyncServer::new(store());
        let (core_a, mut a) = channel();
        let (core_b, mut b) = channel();
        let mut ha = server.accept(core_a);
        let mut hb = server.accept(core_b);
        a.send(SurfaceEvent::Connect);
        b.send(SurfaceEvent::Connect);
        assert!(ha.wait_for(ConnectionState::Connected).await);
        assert!(hb.wait_for(ConnectionState::Connected).await);

        ha.close();
        server.store().commit("doc/SET", json!("only b")).unwrap();

        assert!(matches!(a.recv().await, Some(CoreEvent::InitialState(_))));
        assert_eq!(a.recv().await, None);

        assert!(matches!(b.recv().await, Some(CoreEvent::InitialState(_))));
        assert!(matches!(b.recv().await, Some(CoreEvent::Commit(_))));
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let server = SyncServer::new(store());
        let (core, mut surface) = channel();
        server.accept(core);
        server.shutdown().await;
        assert_eq!(server.connection_count(), 0);
        assert_eq!(surface.recv().await, None);
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_commands() {
        let server = SyncServer::new(store());
        let (core, surface) = channel();
        server.accept(core);

        surface.send(request(1, "doc/slow", json!("late")));
        while server.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        server.shutdown().await;
        assert_eq!(server.in_flight(), 0);
        assert_eq!(server.store().state()["doc"]["title"], json!("late"));
    }
}
