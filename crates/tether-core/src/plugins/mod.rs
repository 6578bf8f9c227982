// ── Store plugins ──
//
// Observers installed on a store through `subscribe`.

mod file_state;
mod logger;

pub use file_state::{FileState, read_state, write_state};
pub use logger::{LoggerOptions, MutationLogger, render_payload};
