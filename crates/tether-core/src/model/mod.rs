// ── Domain model ──
//
// Serializable shapes shared by the store modules and the wire protocol.

mod error_object;
mod item;
mod user;

pub use error_object::{DetailCode, ErrorObject, ValidationError, ValidationErrorDetails};
pub use item::{ItemData, StoredItem};
pub use user::UserInfo;
