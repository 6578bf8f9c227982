// ── Authentication capability ──
//
// The store never talks to an identity backend directly. The `auth`
// module drives whatever `AuthProvider` the host supplies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::model::UserInfo;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authentication provider unavailable: {message}")]
    Unavailable { message: String },
}

/// Opaque identity capability.
pub trait AuthProvider: Send + Sync {
    /// Receiver of the signed-in user; `None` while signed out.
    fn on_auth_change(&self) -> watch::Receiver<Option<UserInfo>>;

    fn current_user(&self) -> Option<UserInfo> {
        let rx = self.on_auth_change();
        rx.borrow().clone()
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<UserInfo, AuthError>>;

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>>;
}

struct Account {
    password: SecretString,
    user: UserInfo,
}

/// In-process provider backed by a fixed account table.
pub struct MemoryAuthProvider {
    accounts: Mutex<HashMap<String, Account>>,
    current: watch::Sender<Option<UserInfo>>,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current,
        }
    }

    /// Add an account. The uid is generated; the provider id is `password`.
    #[must_use]
    pub fn with_account(
        self,
        email: impl Into<String>,
        password: SecretString,
        display_name: Option<String>,
    ) -> Self {
        let email = email.into();
        let user = UserInfo {
            display_name,
            email: Some(email.clone()),
            phone_number: None,
            photo_url: None,
            provider_id: "password".into(),
            uid: Uuid::new_v4().to_string(),
        };
        self.accounts().insert(email, Account { password, user });
        self
    }

    /// Resume a session recorded by an earlier run.
    ///
    /// Only a user whose email belongs to a known account is accepted. The
    /// recorded uid is kept so the restored user matches the saved one.
    pub fn resume(&self, user: &UserInfo) -> bool {
        let resumed = {
            let mut accounts = self.accounts();
            let Some(account) = user.email.as_deref().and_then(|e| accounts.get_mut(e)) else {
                return false;
            };
            account.user.uid.clone_from(&user.uid);
            account.user.clone()
        };
        debug!(uid = %resumed.uid, "session resumed");
        self.current.send_replace(Some(resumed));
        true
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<String, Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for MemoryAuthProvider {
    fn on_auth_change(&self) -> watch::Receiver<Option<UserInfo>> {
        self.current.subscribe()
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<UserInfo, AuthError>> {
        async move {
            let user = {
                let accounts = self.accounts();
                let account = accounts.get(email).ok_or(AuthError::InvalidCredentials)?;
                if account.password.expose_secret() != password.expose_secret() {
                    return Err(AuthError::InvalidCredentials);
                }
                account.user.clone()
            };
            debug!(uid = %user.uid, "signed in");
            self.current.send_replace(Some(user.clone()));
            Ok(user)
        }
        .boxed()
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        async move {
            self.current.send_replace(None);
            Ok::<(), AuthError>(())
        }
        .boxed()
    }
}

impl std::fmt::Debug for MemoryAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAuthProvider")
            .field("accounts", &self.accounts().len())
            .finish_non_exhaustive()
    }
}
