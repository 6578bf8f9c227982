// ── Module definitions ──
//
// A module contributes one top-level key of the state tree plus the
// mutations and actions that operate on it. Typed helpers convert
// between the JSON tree and the module's own state struct.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::ActionContext;
use crate::error::StoreError;

pub(crate) type MutationFn =
    Arc<dyn Fn(&mut Value, Value) -> Result<(), StoreError> + Send + Sync>;

pub(crate) type ActionFn =
    Arc<dyn Fn(ActionContext, Value) -> BoxFuture<'static, Result<Value, StoreError>> + Send + Sync>;

/// A named slice of the state tree with its mutations and actions.
///
/// Names registered here are module-relative; the store qualifies them
/// as `module/NAME` when the module is added to a [`StoreBuilder`](super::StoreBuilder).
pub struct Module {
    pub(crate) name: String,
    pub(crate) initial_state: Result<Value, serde_json::Error>,
    pub(crate) mutations: Vec<(String, MutationFn)>,
    pub(crate) actions: Vec<(String, ActionFn)>,
}

impl Module {
    pub fn new(name: impl Into<String>, initial_state: impl Serialize) -> Self {
        Self {
            name: name.into(),
            initial_state: serde_json::to_value(initial_state),
            mutations: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a mutation operating on the raw JSON sub-state.
    pub fn mutation<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut Value, Value) -> Result<(), StoreError> + Send + Sync + 'static,
    {
        self.mutations.push((name.to_owned(), Arc::new(handler)));
        self
    }

    /// Register a mutation over the module's typed state.
    ///
    /// The sub-state and payload are deserialized, the handler runs, and
    /// the result is written back. Any conversion failure leaves the
    /// tree untouched.
    pub fn typed_mutation<S, P, F>(self, name: &str, handler: F) -> Self
    where
        S: Serialize + DeserializeOwned,
        P: DeserializeOwned,
        F: Fn(&mut S, P) + Send + Sync + 'static,
    {
        let module = self.name.clone();
        let kind = format!("{}/{name}", self.name);

        self.mutation(name, move |state, payload| {
            let mut typed: S =
                serde_json::from_value(state.clone()).map_err(|source| StoreError::InvalidState {
                    module: module.clone(),
                    source,
                })?;
            let payload: P =
                serde_json::from_value(payload).map_err(|source| StoreError::InvalidPayload {
                    kind: kind.clone(),
                    source,
                })?;

            handler(&mut typed, payload);

            *state = serde_json::to_value(&typed).map_err(|source| StoreError::InvalidState {
                module: module.clone(),
                source,
            })?;
            Ok(())
        })
    }

    /// Register an action taking and returning raw JSON.
    pub fn action<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, StoreError>> + Send + 'static,
    {
        let erased: ActionFn = Arc::new(move |ctx, payload| handler(ctx, payload).boxed());
        self.actions.push((name.to_owned(), erased));
        self
    }

    /// Register an action with a typed payload and result.
    pub fn typed_action<P, R, F, Fut>(self, name: &str, handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(ActionContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, StoreError>> + Send + 'static,
    {
        let kind = format!("{}/{name}", self.name);
        let handler = Arc::new(handler);

        self.action(name, move |ctx, payload| {
            let parsed =
                serde_json::from_value::<P>(payload).map_err(|source| StoreError::InvalidPayload {
                    kind: kind.clone(),
                    source,
                });
            let handler = Arc::clone(&handler);
            let kind = kind.clone();

            async move {
                let value = handler(ctx, parsed?).await?;
                serde_json::to_value(value).map_err(|e| StoreError::CommandFailed {
                    message: format!("result of {kind} is not serializable: {e}"),
                })
            }
        })
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field(
                "mutations",
                &self.mutations.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field(
                "actions",
                &self.actions.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
