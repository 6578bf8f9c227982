// ── Sync protocol ──
//
// Core and surface ends of the mirror protocol and the channel between
// them.

mod client;
mod protocol;
mod server;

pub use client::Surface;
pub use protocol::{
    CommandReply, CommandRequest, CoreEnd, CoreEvent, SurfaceEnd, SurfaceEvent, channel,
};
pub use server::{ConnectionHandle, ConnectionId, ConnectionState, SyncServer};
