// ── Items module ──
//
// A cache of user-entered items with sequential string ids, plus the
// last validation error produced by `add` or `change`.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{ErrorObject, ItemData, StoredItem};
use crate::store::{Module, Store};
use crate::validation::validate;

pub const MODULE: &str = "items";

pub const ADD: &str = "ADD";
pub const CHANGE: &str = "CHANGE";
pub const REMOVE: &str = "REMOVE";
pub const ERROR: &str = "ERROR";
pub const CLEAR_ERROR: &str = "CLEAR_ERROR";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItemsState {
    /// Last id handed out; the next item gets `current_id + 1`.
    pub current_id: u64,
    pub cache: Vec<StoredItem>,
    pub owner: Option<String>,
    pub loading: bool,
    pub error: Option<ErrorObject>,
}

impl ItemsState {
    /// Messages of validation details recorded for `field`.
    pub fn field_errors(&self, field: &str) -> Vec<&str> {
        self.error
            .iter()
            .flat_map(ErrorObject::details)
            .filter(|d| d.field == field)
            .map(|d| d.message.as_str())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&StoredItem> {
        self.cache.iter().find(|item| item.id == id)
    }
}

// ── Mutations ────────────────────────────────────────────────────

pub fn add(state: &mut ItemsState, data: ItemData) {
    state.current_id += 1;
    state.cache.push(StoredItem {
        id: state.current_id.to_string(),
        data,
    });
}

/// Replace the data of the item with a matching id. Unknown ids are a no-op.
pub fn change(state: &mut ItemsState, item: StoredItem) {
    if let Some(target) = state.cache.iter_mut().find(|x| x.id == item.id) {
        target.data = item.data;
    }
}

pub fn remove(state: &mut ItemsState, id: String) {
    state.cache.retain(|x| x.id != id);
}

pub fn error(state: &mut ItemsState, error: ErrorObject) {
    state.error = Some(error);
}

pub fn clear_error(state: &mut ItemsState, (): ()) {
    state.error = None;
}

fn base() -> Module {
    Module::new(MODULE, ItemsState::default())
        .typed_mutation(ADD, add)
        .typed_mutation(CHANGE, change)
        .typed_mutation(REMOVE, remove)
        .typed_mutation(ERROR, error)
        .typed_mutation(CLEAR_ERROR, clear_error)
}

pub fn module() -> Module {
    base()
        .typed_action("add", |ctx, data: ItemData| async move {
            if let Some(err) = validate(&data) {
                return ctx.commit(ERROR, ErrorObject::from(err));
            }
            ctx.commit(ADD, data)
        })
        .typed_action("change", |ctx, item: StoredItem| async move {
            if let Some(err) = validate(&item.data) {
                return ctx.commit(ERROR, ErrorObject::from(err));
            }
            ctx.commit(CHANGE, item)
        })
        .typed_action("remove", |ctx, id: String| async move {
            ctx.commit(REMOVE, id)
        })
        .typed_action("clearError", |ctx, _: IgnoredAny| async move {
            ctx.commit(CLEAR_ERROR, ())
        })
}

/// Mutations only, for surface mirrors.
pub fn mirror_module() -> Module {
    base()
}

pub fn state_of(store: &Store) -> Result<ItemsState, StoreError> {
    store.module_state(MODULE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::DetailCode;

    fn data(name: &str, url: &str) -> ItemData {
        ItemData {
            name: name.into(),
            url: url.into(),
            description: String::new(),
        }
    }

    fn store() -> Store {
        Store::builder().module(module()).build().unwrap()
    }

    #[test]
    fn initial_state_shape() {
        let store = store();
        assert_eq!(
            store.state()["items"],
            json!({"currentId": 0, "cache": [], "owner": null, "loading": false, "error": null})
        );
    }

    #[test]
    fn ids_keep_counting_after_remove() {
        let mut state = ItemsState::default();
        add(&mut state, data("a", "http://a"));
        remove(&mut state, "1".into());
        add(&mut state, data("b", "http://b"));

        assert_eq!(state.current_id, 2);
        let ids: Vec<_> = state.cache.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["2"]);
    }

    #[test]
    fn change_replaces_data_of_matching_id_only() {
        let mut state = ItemsState::default();
        add(&mut state, data("a", "http://a"));
        change(
            &mut state,
            StoredItem {
                id: "1".into(),
                data: data("A", "http://A"),
            },
        );
        change(
            &mut state,
            StoredItem {
                id: "9".into(),
                data: data("ghost", "http://g"),
            },
        );

        assert_eq!(state.cache.len(), 1);
        assert_eq!(state.get("1").unwrap().data.name, "A");
    }

    #[tokio::test]
    async fn invalid_add_records_error_and_adds_nothing() {
        let store = store();
        let value = store
            .dispatch("items/add", json!({"name": "", "url": "ftp://x"}))
            .await
            .unwrap();
        assert_eq!(value, serde_json::Value::Null);

        let state = state_of(&store).unwrap();
        assert!(state.cache.is_empty());
        assert_eq!(state.current_id, 0);
        let err = state.error.as_ref().unwrap();
        assert_eq!(err.code(), "error/validation");
        assert_eq!(state.field_errors("name"), ["The name field is required."]);
        assert_eq!(state.field_errors("url"), ["The URL field is not a valid URL."]);
        assert_eq!(err.details()[1].code, DetailCode::Url);
    }

    #[tokio::test]
    async fn valid_add_then_clear_error() {
        let store = store();
        store
            .dispatch("items/add", json!({"name": "", "url": ""}))
            .await
            .unwrap();
        store
            .dispatch("items/add", json!({"name": "n", "url": "https://n"}))
            .await
            .unwrap();
        store.dispatch("items/clearError", json!(null)).await.unwrap();

        let state = state_of(&store).unwrap();
        assert_eq!(state.cache.len(), 1);
        assert_eq!(state.cache[0].id, "1");
        assert_eq!(state.error, None);
        assert!(state.field_errors("name").is_empty());
    }

    #[tokio::test]
    async fn invalid_change_is_not_applied() {
        let store = store();
        store
            .dispatch("items/add", json!({"name": "n", "url": "http://n"}))
            .await
            .unwrap();
        store
            .dispatch("items/change", json!({"id": "1", "data": {"name": "", "url": "http://n"}}))
            .await
            .unwrap();

        let state = state_of(&store).unwrap();
        assert_eq!(state.get("1").unwrap().data.name, "n");
        assert_eq!(state.field_errors("name").len(), 1);
    }

    #[tokio::test]
    async fn remove_action_filters_by_id() {
        let store = store();
        for name in ["a", "b", "c"] {
            store
                .dispatch("items/add", json!({"name": name, "url": "http://x"}))
                .await
                .unwrap();
        }
        store.dispatch("items/remove", json!("2")).await.unwrap();

        let ids: Vec<_> = state_of(&store)
            .unwrap()
            .cache
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, ["1", "3"]);
    }
}
