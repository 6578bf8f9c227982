// ── Auth module ──
//
// Mirrors the provider's signed-in user into state. `init` bridges the
// provider's change feed into SET/CLEAR commits on a background task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::SecretString;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::auth::AuthProvider;
use crate::error::StoreError;
use crate::model::{ErrorObject, UserInfo};
use crate::store::{ActionContext, Module, Store};

pub const MODULE: &str = "auth";

pub const SET_CURRENT_USER: &str = "SET_CURRENT_USER";
pub const CLEAR_CURRENT_USER: &str = "CLEAR_CURRENT_USER";
pub const SIGN_IN: &str = "SIGN_IN";
pub const SIGN_OUT: &str = "SIGN_OUT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthState {
    pub current_user: Option<UserInfo>,
    /// `true` until the provider reports, and while a sign-in/out runs.
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            current_user: None,
            loading: true,
        }
    }
}

/// Payload of `auth/signInWithEmailAndPassword`.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

// ── Mutations ────────────────────────────────────────────────────

pub fn set_current_user(state: &mut AuthState, user: UserInfo) {
    state.current_user = Some(user);
    state.loading = false;
}

pub fn clear_current_user(state: &mut AuthState, (): ()) {
    state.current_user = None;
    state.loading = false;
}

pub fn sign_in(state: &mut AuthState, (): ()) {
    state.loading = true;
}

pub fn sign_out(state: &mut AuthState, (): ()) {
    state.loading = true;
}

fn base() -> Module {
    Module::new(MODULE, AuthState::default())
        .typed_mutation(SET_CURRENT_USER, set_current_user)
        .typed_mutation(CLEAR_CURRENT_USER, clear_current_user)
        .typed_mutation(SIGN_IN, sign_in)
        .typed_mutation(SIGN_OUT, sign_out)
}

fn apply_user(ctx: &ActionContext, user: Option<UserInfo>) -> Result<(), StoreError> {
    match user {
        Some(user) => ctx.commit(SET_CURRENT_USER, user),
        None => ctx.commit(CLEAR_CURRENT_USER, ()),
    }
}

fn rejected(err: &impl std::fmt::Display) -> StoreError {
    StoreError::Rejected(ErrorObject::unknown(err.to_string()))
}

pub fn module(provider: Arc<dyn AuthProvider>) -> Module {
    let init_provider = Arc::clone(&provider);
    let initialized = Arc::new(AtomicBool::new(false));
    let sign_in_provider = Arc::clone(&provider);
    let sign_out_provider = provider;

    base()
        .typed_action("init", move |ctx, _: IgnoredAny| {
            let provider = Arc::clone(&init_provider);
            let first = !initialized.swap(true, Ordering::SeqCst);
            async move {
                if !first {
                    debug!("auth already initialized");
                    return Ok(());
                }

                let mut changes = provider.on_auth_change();
                let user = changes.borrow_and_update().clone();
                apply_user(&ctx, user)?;

                tokio::spawn(async move {
                    while changes.changed().await.is_ok() {
                        let user = changes.borrow_and_update().clone();
                        if let Err(e) = apply_user(&ctx, user) {
                            error!(error = %e, "failed to record auth change");
                        }
                    }
                    debug!("auth provider feed closed");
                });
                Ok::<(), StoreError>(())
            }
        })
        .typed_action(
            "signInWithEmailAndPassword",
            move |ctx, credentials: Credentials| {
                let provider = Arc::clone(&sign_in_provider);
                async move {
                    ctx.commit(SIGN_IN, ())?;
                    match provider
                        .sign_in(&credentials.email, &credentials.password)
                        .await
                    {
                        Ok(user) => Ok(user),
                        Err(e) => {
                            // `loading` stays set unless restored here.
                            apply_user(&ctx, provider.current_user())?;
                            Err(rejected(&e))
                        }
                    }
                }
            },
        )
        .typed_action("signOut", move |ctx, _: IgnoredAny| {
            let provider = Arc::clone(&sign_out_provider);
            async move {
                ctx.commit(SIGN_OUT, ())?;
                if let Err(e) = provider.sign_out().await {
                    apply_user(&ctx, provider.current_user())?;
                    return Err(rejected(&e));
                }
                Ok(())
            }
        })
}

/// Mutations only, for surface mirrors.
pub fn mirror_module() -> Module {
    base()
}

pub fn state_of(store: &Store) -> Result<AuthState, StoreError> {
    store.module_state(MODULE)
}
