// ── Store ──
//
// The canonical state tree lives behind an `ArcSwap` so reads never
// block. Commits are serialized by `commit_lock`; each commit clones the
// tree, applies one handler to its module slot, swaps the new tree in,
// then fans out to subscribers, watchers and the snapshot channel in
// that order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, error};

use super::context::ActionContext;
use super::module::{ActionFn, Module, MutationFn};
use super::subscription::{MutationRecord, Slot, Subscription};
use crate::error::StoreError;
use crate::stream::StateStream;

type SubscriberFn = Arc<dyn Fn(&MutationRecord, &Arc<Value>) + Send + Sync>;
type Selector = Box<dyn Fn(&Value) -> Value + Send + Sync>;
type WatchCallback = Box<dyn Fn(&Value, &Value) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

struct Registered<T> {
    module: Arc<str>,
    handler: T,
}

struct Watcher {
    selector: Selector,
    callback: WatchCallback,
    last: Mutex<Value>,
}

impl Watcher {
    fn check(&self, state: &Value) {
        let next = (self.selector)(state);
        let mut last = lock(&self.last);
        if *last == next {
            return;
        }
        let previous = std::mem::replace(&mut *last, next);
        (self.callback)(&last, &previous);
    }
}

pub(crate) struct StoreInner {
    state: ArcSwap<Value>,
    initial: Map<String, Value>,
    mutations: HashMap<String, Registered<MutationFn>>,
    actions: HashMap<String, Registered<ActionFn>>,
    subscribers: RwLock<BTreeMap<u64, SubscriberFn>>,
    watchers: RwLock<BTreeMap<u64, Arc<Watcher>>>,
    next_id: AtomicU64,
    commit_lock: Mutex<()>,
    snapshot: watch::Sender<Arc<Value>>,
}

impl StoreInner {
    pub(crate) fn remove(&self, id: u64, slot: Slot) {
        match slot {
            Slot::Mutations => {
                write(&self.subscribers).remove(&id);
            }
            Slot::Watcher => {
                write(&self.watchers).remove(&id);
            }
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn notify_subscribers(&self, record: &MutationRecord, state: &Arc<Value>) {
        // Snapshot the list so callbacks may unsubscribe themselves.
        let subscribers: Vec<SubscriberFn> = read(&self.subscribers).values().cloned().collect();
        for subscriber in subscribers {
            subscriber(record, state);
        }
    }

    fn publish(&self, state: &Arc<Value>) {
        let watchers: Vec<Arc<Watcher>> = read(&self.watchers).values().cloned().collect();
        for watcher in watchers {
            watcher.check(state);
        }
        self.snapshot.send_replace(Arc::clone(state));
    }
}

/// Reactive key/value state tree with named mutations and actions.
///
/// Cheap to clone; all clones share the same tree and registry.
///
/// Subscriber and watcher callbacks run synchronously inside `commit`
/// while the commit lock is held. They must not commit.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Apply the mutation registered under `kind`.
    ///
    /// The tree is replaced only if the handler succeeds. Subscribers see
    /// the record and the post-mutation tree, in registration order.
    pub fn commit(&self, kind: &str, payload: Value) -> Result<(), StoreError> {
        let Some(entry) = self.inner.mutations.get(kind) else {
            error!(kind, "unknown mutation type");
            return Err(StoreError::UnknownMutation {
                kind: kind.to_owned(),
            });
        };

        let _guard = lock(&self.inner.commit_lock);

        let mut next = Value::clone(&**self.inner.state.load());
        let Value::Object(root) = &mut next else {
            return Err(StoreError::InvalidRoot);
        };
        let slot = root
            .entry(entry.module.to_string())
            .or_insert(Value::Null);
        (entry.handler)(slot, payload.clone())?;

        let next = Arc::new(next);
        self.inner.state.store(Arc::clone(&next));

        let record = MutationRecord::new(kind, payload);
        self.inner.notify_subscribers(&record, &next);
        self.inner.publish(&next);
        Ok(())
    }

    /// Swap in a whole new tree without emitting a mutation record.
    ///
    /// Modules missing from `new_state` keep their initial state.
    /// Watchers and streams are notified; mutation subscribers are not.
    pub fn replace_state(&self, new_state: Value) -> Result<(), StoreError> {
        let Value::Object(mut root) = new_state else {
            return Err(StoreError::InvalidRoot);
        };
        for (module, initial) in &self.inner.initial {
            if !root.contains_key(module) {
                root.insert(module.clone(), initial.clone());
            }
        }

        let _guard = lock(&self.inner.commit_lock);
        let next = Arc::new(Value::Object(root));
        self.inner.state.store(Arc::clone(&next));
        self.inner.publish(&next);
        debug!("state replaced");
        Ok(())
    }

    // ── Actions ──────────────────────────────────────────────────

    /// Run the action registered under `kind` and await its result.
    pub async fn dispatch(&self, kind: &str, payload: Value) -> Result<Value, StoreError> {
        let Some(entry) = self.inner.actions.get(kind) else {
            error!(kind, "unknown action type");
            return Err(StoreError::UnknownCommand {
                kind: kind.to_owned(),
            });
        };

        debug!(kind, "dispatching action");
        let ctx = ActionContext::new(self.clone(), Arc::clone(&entry.module));
        let fut = (entry.handler)(ctx, payload);
        fut.await
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn state(&self) -> Arc<Value> {
        self.inner.state.load_full()
    }

    /// Deserialize the sub-state of one module.
    pub fn module_state<S: DeserializeOwned>(&self, module: &str) -> Result<S, StoreError> {
        let value = self.state().get(module).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|source| StoreError::InvalidState {
            module: module.to_owned(),
            source,
        })
    }

    pub fn module_names(&self) -> Vec<String> {
        self.inner.initial.keys().cloned().collect()
    }

    pub fn has_mutation(&self, kind: &str) -> bool {
        self.inner.mutations.contains_key(kind)
    }

    pub fn has_action(&self, kind: &str) -> bool {
        self.inner.actions.contains_key(kind)
    }

    /// Stream of whole-tree snapshots, updated after every change.
    pub fn stream(&self) -> StateStream {
        StateStream::new(self.inner.snapshot.subscribe())
    }

    // ── Observation ──────────────────────────────────────────────

    /// Register a callback invoked after every successful commit.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MutationRecord, &Arc<Value>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id();
        write(&self.inner.subscribers).insert(id, Arc::new(callback));
        Subscription::new(Arc::downgrade(&self.inner), id, Slot::Mutations)
    }

    /// Hand the current tree to `on_snapshot`, then subscribe, with no
    /// commit able to land in between.
    pub fn subscribe_with_snapshot<S, F>(&self, on_snapshot: S, callback: F) -> Subscription
    where
        S: FnOnce(Arc<Value>),
        F: Fn(&MutationRecord, &Arc<Value>) + Send + Sync + 'static,
    {
        let _guard = lock(&self.inner.commit_lock);
        on_snapshot(self.state());
        self.subscribe(callback)
    }

    /// Invoke `callback(new, old)` whenever `selector(state)` changes.
    pub fn watch<Sel, F>(&self, selector: Sel, callback: F) -> Subscription
    where
        Sel: Fn(&Value) -> Value + Send + Sync + 'static,
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let _guard = lock(&self.inner.commit_lock);
        let last = selector(&**self.inner.state.load());
        let watcher = Arc::new(Watcher {
            selector: Box::new(selector),
            callback: Box::new(callback),
            last: Mutex::new(last),
        });
        let id = self.inner.next_id();
        write(&self.inner.watchers).insert(id, watcher);
        Subscription::new(Arc::downgrade(&self.inner), id, Slot::Watcher)
    }

    /// Watch the value at a JSON pointer such as `/document/title`.
    /// A missing path reads as `null`.
    pub fn watch_pointer<F>(&self, pointer: &str, callback: F) -> Subscription
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let pointer = pointer.to_owned();
        self.watch(
            move |state| state.pointer(&pointer).cloned().unwrap_or(Value::Null),
            callback,
        )
    }

    pub fn subscriber_count(&self) -> usize {
        read(&self.inner.subscribers).len()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("modules", &self.module_names())
            .finish_non_exhaustive()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Collects modules and produces a [`Store`].
///
/// Registration is fixed once built. A duplicate module, mutation or
/// action name fails the build.
#[derive(Debug, Default)]
pub struct StoreBuilder {
    modules: Vec<Module>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    pub fn build(self) -> Result<Store, StoreError> {
        let mut initial = Map::new();
        let mut mutations = HashMap::new();
        let mut actions = HashMap::new();

        for module in self.modules {
            if initial.contains_key(&module.name) {
                return Err(StoreError::DuplicateRegistration { kind: module.name });
            }
            let state = module
                .initial_state
                .map_err(|source| StoreError::InvalidState {
                    module: module.name.clone(),
                    source,
                })?;
            let name: Arc<str> = Arc::from(module.name.as_str());

            for (mutation, handler) in module.mutations {
                let kind = format!("{name}/{mutation}");
                if mutations.contains_key(&kind) {
                    return Err(StoreError::DuplicateRegistration { kind });
                }
                let module = Arc::clone(&name);
                mutations.insert(kind, Registered { module, handler });
            }

            for (action, handler) in module.actions {
                let kind = format!("{name}/{action}");
                if actions.contains_key(&kind) {
                    return Err(StoreError::DuplicateRegistration { kind });
                }
                let module = Arc::clone(&name);
                actions.insert(kind, Registered { module, handler });
            }

            initial.insert(module.name, state);
        }

        let root = Arc::new(Value::Object(initial.clone()));
        let (snapshot, _) = watch::channel(Arc::clone(&root));

        Ok(Store {
            inner: Arc::new(StoreInner {
                state: ArcSwap::new(root),
                initial,
                mutations,
                actions,
                subscribers: RwLock::new(BTreeMap::new()),
                watchers: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                commit_lock: Mutex::new(()),
                snapshot,
            }),
        })
    }
}
