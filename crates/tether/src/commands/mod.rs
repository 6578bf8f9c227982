//! Command dispatch: bridges CLI args -> surface commands -> output formatting.
//!
//! Read-only commands load the snapshot into a bare mirror store. Mutating
//! commands start a [`Host`], connect an in-process [`Surface`] and send
//! every change through the sync channel, then drain persistence.

pub mod auth;
pub mod config_cmd;
pub mod items;
pub mod state;
pub mod title;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tether_config::Config;
use tether_core::modules::auth as auth_module;
use tether_core::{Host, Store, Surface, modules, read_state};
use tracing::debug;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Resolved configuration shared by every handler.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
}

impl Context {
    /// Snapshot path: `--state`, then the config file, then the platform default.
    pub fn state_path(&self, global: &GlobalOpts) -> PathBuf {
        global
            .state
            .clone()
            .unwrap_or_else(|| self.config.effective_state_path())
    }
}

/// Dispatch a store-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::State(args) => state::handle(args, ctx, global).await,
        Command::Items(args) => items::handle(args, ctx, global).await,
        Command::Title(args) => title::handle(args, ctx, global).await,
        Command::Auth(args) => auth::handle(args, ctx, global).await,
        Command::Config(args) => config_cmd::handle(args, ctx, global),
        Command::Completions(args) => {
            use clap::CommandFactory;

            let mut cmd = crate::cli::Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "tether", &mut std::io::stdout());
            Ok(())
        }
    }
}

// ── Read-only snapshot ───────────────────────────────────────────────

/// Load the snapshot at `path` into a mirror store without starting a host.
///
/// A missing file yields the initial state of every module.
pub async fn load_snapshot(path: &Path) -> Result<Store, CliError> {
    let store = modules::mirror_store()?;
    if let Some(saved) = read_state(path).await? {
        store.replace_state(saved)?;
    }
    Ok(store)
}

// ── Hosted session ───────────────────────────────────────────────────

/// A running host plus one connected surface.
pub struct Session {
    host: Host,
    surface: Surface,
}

impl Session {
    pub async fn open(ctx: &Context, global: &GlobalOpts) -> Result<Self, CliError> {
        let provider = tether_config::build_auth_provider(&ctx.config)
            .map_err(|e| CliError::config(e, &ctx.config_path))?;

        // Pick up the user recorded by an earlier run so `auth/init`
        // confirms it instead of signing out.
        let saved = load_snapshot(&ctx.state_path(global)).await?;
        if let Some(user) = auth_module::state_of(&saved)?.current_user {
            if !provider.resume(&user) {
                debug!(uid = %user.uid, "saved user has no configured account");
            }
        }

        let host_config = tether_config::to_host_config(&ctx.config, global.state.as_deref());
        debug!(state = ?host_config.state_path, "starting host");

        let host = Host::start(host_config, Arc::new(provider)).await?;
        let surface = match host.connect_surface() {
            Ok(surface) => surface,
            Err(err) => {
                host.shutdown().await;
                return Err(err.into());
            }
        };
        if let Err(err) = surface.ready().await {
            surface.close().await;
            host.shutdown().await;
            return Err(err.into());
        }
        Ok(Self { host, surface })
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Disconnect the surface and drain pending snapshot writes.
    pub async fn close(self) {
        self.surface.close().await;
        self.host.shutdown().await;
    }
}
