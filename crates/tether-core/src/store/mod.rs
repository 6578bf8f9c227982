// ── State store ──
//
// Canonical state tree, flat mutation/action registry, synchronous
// subscriber fan-out and selector watches.

mod context;
mod module;
mod state_store;
mod subscription;

pub use context::ActionContext;
pub use module::Module;
pub use state_store::{Store, StoreBuilder};
pub use subscription::{MutationRecord, Subscription};
