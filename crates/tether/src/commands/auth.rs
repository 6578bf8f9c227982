//! Sign-in handlers.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tether_core::modules::auth::{self, AuthState};
use tether_core::{Surface, SyncError, UserInfo};

use crate::cli::{AuthArgs, AuthCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::{Context, Session, load_snapshot};

/// How long the mirror may take to report the provider's answer.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

fn command(name: &str) -> String {
    format!("{}/{name}", auth::MODULE)
}

fn detail(user: Option<&UserInfo>) -> String {
    let Some(user) = user else {
        return "Not signed in".into();
    };
    let mut out = format!(
        "Email:    {}\nUID:      {}",
        user.email.as_deref().unwrap_or("-"),
        user.uid
    );
    if let Some(name) = &user.display_name {
        out.push_str("\nName:     ");
        out.push_str(name);
    }
    out
}

fn print_user(user: Option<UserInfo>, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(&global.format(), &user, |u| detail(u.as_ref()), |u| {
        u.as_ref()
            .and_then(|u| u.email.clone())
            .unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn auth_failed(err: SyncError) -> CliError {
    match err {
        SyncError::Remote(obj) => CliError::AuthFailed {
            message: obj.message().into(),
        },
        other => other.into(),
    }
}

async fn wait_for(surface: &Surface, done: impl Fn(&AuthState) -> bool) -> Result<(), CliError> {
    let mut stream = surface.stream();
    loop {
        let state: AuthState = surface.module_state(auth::MODULE)?;
        if !state.loading && done(&state) {
            return Ok(());
        }
        if stream.changed().await.is_none() {
            return Err(CliError::Disconnected);
        }
    }
}

/// Wait until the mirrored auth state is no longer loading and `done` holds.
///
/// The provider reports through its own feed, so the reply to a sign-in
/// can arrive before the resulting commit.
async fn settle(surface: &Surface, done: impl Fn(&AuthState) -> bool) -> Result<(), CliError> {
    tokio::time::timeout(SETTLE_TIMEOUT, wait_for(surface, done))
        .await
        .map_err(|_| CliError::AuthFailed {
            message: "the provider did not report a result in time".into(),
        })?
}

async fn sign_in(
    surface: &Surface,
    email: &str,
    password: &SecretString,
) -> Result<UserInfo, CliError> {
    let payload = json!({ "email": email, "password": password.expose_secret() });
    let reply = surface
        .dispatch(&command("signInWithEmailAndPassword"), payload)
        .await
        .map_err(auth_failed)?;
    let user: UserInfo =
        serde_json::from_value(reply).map_err(|e| CliError::Render(e.to_string()))?;

    settle(surface, |state| {
        state.current_user.as_ref().map(|u| &u.uid) == Some(&user.uid)
    })
    .await?;
    Ok(user)
}

async fn sign_out(surface: &Surface) -> Result<(), CliError> {
    surface
        .dispatch(&command("signOut"), Value::Null)
        .await
        .map_err(auth_failed)?;
    settle(surface, |state| state.current_user.is_none()).await
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: AuthArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        AuthCommand::Whoami => {
            let store = load_snapshot(&ctx.state_path(global)).await?;
            print_user(auth::state_of(&store)?.current_user, global)
        }

        AuthCommand::SignIn { email } => {
            let account = ctx
                .config
                .accounts
                .get(&email)
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "account".into(),
                    identifier: email.clone(),
                    list_command: "config show".into(),
                })?;
            let password = tether_config::resolve_password(account, &email)
                .map_err(|e| CliError::config(e, &ctx.config_path))?;

            let session = Session::open(ctx, global).await?;
            let result = sign_in(session.surface(), &email, &password).await;
            session.close().await;

            let user = result?;
            output::status(global, &format!("Signed in as {email}"));
            print_user(Some(user), global)
        }

        AuthCommand::SignOut => {
            let store = load_snapshot(&ctx.state_path(global)).await?;
            if auth::state_of(&store)?.current_user.is_none() {
                output::status(global, "Not signed in");
                return Ok(());
            }

            let session = Session::open(ctx, global).await?;
            let result = sign_out(session.surface()).await;
            session.close().await;

            result?;
            output::status(global, "Signed out");
            Ok(())
        }
    }
}
