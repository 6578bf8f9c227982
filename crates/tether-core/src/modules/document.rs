use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{Module, Store, Subscription};
use crate::sync::Surface;

pub const MODULE: &str = "document";

pub const SET_TITLE: &str = "SET_TITLE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentState {
    pub title: String,
}

pub fn set_title(state: &mut DocumentState, title: String) {
    state.title = title;
}

fn base() -> Module {
    Module::new(MODULE, DocumentState::default()).typed_mutation(SET_TITLE, set_title)
}

pub fn module() -> Module {
    base().typed_action("setTitle", |ctx, title: String| async move {
        ctx.commit(SET_TITLE, title)
    })
}

/// Mutations only, for surface mirrors.
pub fn mirror_module() -> Module {
    base()
}

/// Call `on_change` with the new title whenever the mirrored title changes.
pub fn watch_title<F>(surface: &Surface, on_change: F) -> Subscription
where
    F: Fn(&str) + Send + Sync + 'static,
{
    surface.watch_pointer("/document/title", move |new, _| {
        on_change(new.as_str().unwrap_or_default());
    })
}

/// Typed read of the document slice.
pub fn state_of(store: &Store) -> Result<DocumentState, StoreError> {
    store.module_state(MODULE)
}
