// ── Host facade ──
//
// Wires the core store, persistence, logger and sync server together
// for the privileged process.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::auth::AuthProvider;
use crate::error::HostError;
use crate::modules;
use crate::plugins::{FileState, LoggerOptions, MutationLogger};
use crate::store::{Store, Subscription};
use crate::sync::{Surface, SyncServer, channel};

/// Host startup options.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Snapshot file. `None` keeps state in memory only.
    pub state_path: Option<PathBuf>,
    /// Mutation logger options. `None` disables the logger.
    pub logger: Option<LoggerOptions>,
}

/// The privileged side: owns the canonical store and serves surfaces.
pub struct Host {
    store: Store,
    server: SyncServer,
    persistence: Option<FileState>,
    logger: Option<Subscription>,
}

impl Host {
    /// Build the store, restore persisted state, install plugins, run
    /// `auth/init` and start the sync server.
    ///
    /// A snapshot that exists but cannot be read or parsed fails startup.
    pub async fn start(config: HostConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, HostError> {
        let store = modules::core_store(auth)?;

        let logger = config
            .logger
            .map(|options| MutationLogger::new(options).install(&store));

        let persistence = match config.state_path {
            Some(path) => {
                let fs = FileState::new(path);
                fs.attach(&store).await?;
                Some(fs)
            }
            None => None,
        };

        store
            .dispatch(&format!("{}/init", modules::auth::MODULE), Value::Null)
            .await?;

        let server = SyncServer::new(store.clone());
        info!(
            persisted = persistence.is_some(),
            "host started"
        );

        Ok(Self {
            store,
            server,
            persistence,
            logger,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn server(&self) -> &SyncServer {
        &self.server
    }

    pub fn persistence(&self) -> Option<&FileState> {
        self.persistence.as_ref()
    }

    /// Open an in-process channel, accept its core end and connect a
    /// surface with a fresh mirror on the other.
    pub fn connect_surface(&self) -> Result<Surface, HostError> {
        let (core_end, surface_end) = channel();
        let handle = self.server.accept(core_end);
        debug!(id = %handle.id(), "in-process surface attached");
        let mirror = modules::mirror_store()?;
        Ok(Surface::connect(mirror, surface_end)?)
    }

    /// Wait for the most recently scheduled snapshot write.
    pub async fn flush(&self) {
        if let Some(fs) = &self.persistence {
            fs.write().await;
        }
    }

    /// Close every connection, let in-flight commands finish, drain
    /// pending writes and detach plugins.
    pub async fn shutdown(self) {
        self.server.shutdown().await;
        if let Some(fs) = &self.persistence {
            fs.write().await;
            fs.close().await;
        }
        if let Some(logger) = &self.logger {
            logger.unsubscribe();
        }
        info!("host stopped");
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("server", &self.server)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}
