use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::Store;
use crate::error::StoreError;

/// Handle injected into every action.
///
/// `commit` resolves names relative to the action's own module, so
/// `items/add` commits `ADD` as `items/ADD`.
#[derive(Clone)]
pub struct ActionContext {
    store: Store,
    module: Arc<str>,
}

impl ActionContext {
    pub(crate) fn new(store: Store, module: Arc<str>) -> Self {
        Self { store, module }
    }

    /// Name of the module that owns the running action.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Commit a mutation of this module.
    pub fn commit(&self, name: &str, payload: impl Serialize) -> Result<(), StoreError> {
        let kind = format!("{}/{name}", self.module);
        let payload = serde_json::to_value(payload).map_err(|source| StoreError::InvalidPayload {
            kind: kind.clone(),
            source,
        })?;
        self.store.commit(&kind, payload)
    }

    /// Commit a fully qualified mutation of any module.
    pub fn commit_root(&self, kind: &str, payload: Value) -> Result<(), StoreError> {
        self.store.commit(kind, payload)
    }

    /// Current sub-state of this module.
    pub fn state(&self) -> Value {
        self.store
            .state()
            .get(&*self.module)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Current sub-state of this module, deserialized.
    pub fn module_state<S: DeserializeOwned>(&self) -> Result<S, StoreError> {
        self.store.module_state(&self.module)
    }

    /// Full state tree.
    pub fn root_state(&self) -> Arc<Value> {
        self.store.state()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}
