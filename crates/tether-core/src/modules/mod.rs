// ── Domain modules ──
//
// `document`, `items` and `auth`, and the two stores assembled from
// them: the authoritative core store and the mutation-only mirror used
// by surfaces.

pub mod auth;
pub mod document;
pub mod items;

use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::error::StoreError;
use crate::store::Store;

/// Store for the privileged process, with every action registered.
pub fn core_store(provider: Arc<dyn AuthProvider>) -> Result<Store, StoreError> {
    Store::builder()
        .module(document::module())
        .module(items::module())
        .module(auth::module(provider))
        .build()
}

/// Store for a surface: same state shape and mutations, no actions.
pub fn mirror_store() -> Result<Store, StoreError> {
    Store::builder()
        .module(document::mirror_module())
        .module(items::mirror_module())
        .module(auth::mirror_module())
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::MemoryAuthProvider;

    #[test]
    fn core_and_mirror_share_initial_state() {
        let core = core_store(Arc::new(MemoryAuthProvider::new())).unwrap();
        let mirror = mirror_store().unwrap();
        assert_eq!(core.state(), mirror.state());
        assert_eq!(core.module_names(), ["auth", "document", "items"]);
    }
}
