use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state_store::StoreInner;

/// One applied mutation, as seen by subscribers and sent as a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Qualified mutation name, `module/NAME`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl MutationRecord {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Mutations,
    Watcher,
}

/// Registration handle returned by `subscribe` and `watch`.
///
/// Dropping the handle keeps the registration alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it. Unsubscribing twice
/// is a no-op.
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
    slot: Slot,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(store: Weak<StoreInner>, id: u64, slot: Slot) -> Self {
        Self {
            store,
            id,
            slot,
            active: AtomicBool::new(true),
        }
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            inner.remove(self.id, self.slot);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("active", &self.is_active())
            .finish()
    }
}
