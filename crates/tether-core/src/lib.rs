//! Single-writer state store and the sync layer that mirrors it into
//! untrusted front-end surfaces.
//!
//! - **[`Store`]**: Owns the canonical state tree. Named mutations are
//!   applied synchronously and broadcast to subscribers in registration
//!   order; named commands (actions) may await and commit any number of
//!   mutations. Built once from a set of [`Module`]s via [`StoreBuilder`].
//!
//! - **[`FileState`]**: Persistence plugin. Reads the snapshot file at
//!   most once, then rewrites the full tree after every mutation on a
//!   single writer task so writes never overlap.
//!
//! - **[`SyncServer`]** / **[`Surface`]**: The two ends of the sync
//!   protocol. The server streams `initialState` then `commit` deltas to
//!   each connection and answers `dispatch` requests with exactly one
//!   reply; the surface keeps a read-only mirror and turns command calls
//!   into id-correlated request/reply round trips.
//!
//! - **[`Host`]**: Facade wiring store, persistence, logger and sync
//!   server together for the privileged process.
//!
//! - **Domain modules** ([`modules`]): `document`, `items` and `auth`,
//!   with item validation in [`validation`].

pub mod auth;
pub mod error;
pub mod host;
pub mod model;
pub mod modules;
pub mod plugins;
pub mod store;
pub mod stream;
pub mod sync;
pub mod validation;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::{AuthError, AuthProvider, MemoryAuthProvider};
pub use error::{HostError, PersistError, StoreError, SyncError};
pub use host::{Host, HostConfig};
pub use plugins::{FileState, LoggerOptions, MutationLogger, read_state, write_state};
pub use store::{ActionContext, Module, MutationRecord, Store, StoreBuilder, Subscription};
pub use stream::StateStream;
pub use sync::{
    CommandReply, CommandRequest, ConnectionHandle, ConnectionId, ConnectionState, CoreEnd,
    CoreEvent, Surface, SurfaceEnd, SurfaceEvent, SyncServer, channel,
};
pub use validation::validate;

pub use model::{
    DetailCode, ErrorObject, ItemData, StoredItem, UserInfo, ValidationError,
    ValidationErrorDetails,
};
