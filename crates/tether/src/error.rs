//! CLI error types with miette diagnostics.
//!
//! Maps core, sync and config failures into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use tether_config::ConfigError;
use tether_core::{HostError, PersistError, StoreError, SyncError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Channel ──────────────────────────────────────────────────────
    #[error("The host closed the channel before replying")]
    #[diagnostic(
        code(tether::disconnected),
        help("The command may or may not have been applied. Run: tether state show")
    )]
    Disconnected,

    #[error("Command failed ({code}): {message}")]
    #[diagnostic(code(tether::remote))]
    Remote { code: String, message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(tether::not_found),
        help("Run: tether {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(tether::conflict), help("Pass --force to overwrite it."))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(tether::validation), help("{details}"))]
    Rejected { message: String, details: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tether::usage))]
    Validation { field: String, reason: String },

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(tether::confirmation_required),
        help("Re-run with --yes (-y) to proceed.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Auth ─────────────────────────────────────────────────────────
    #[error("Sign-in failed: {message}")]
    #[diagnostic(
        code(tether::auth),
        help("Check the account's password in your config file.")
    )]
    AuthFailed { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No password configured for account '{account}'")]
    #[diagnostic(
        code(tether::no_credentials),
        help(
            "Set `password` or `password_env` under [accounts.\"{account}\"]\n\
             in your config file."
        )
    )]
    NoCredentials { account: String },

    #[error("Invalid configuration: {source}")]
    #[diagnostic(code(tether::config), help("Check the config file at: {path}"))]
    Config {
        path: String,
        #[source]
        source: Box<ConfigError>,
    },

    // ── State ────────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(tether::state_file),
        help("Fix or remove the snapshot file, or run: tether state reset --yes")
    )]
    StateFile(PersistError),

    #[error(transparent)]
    #[diagnostic(code(tether::store))]
    Store(StoreError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(tether::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Disconnected => exit_code::CONNECTION,
            Self::NoCredentials { .. } | Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Rejected { .. }
            | Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Wrap a config failure, attributing it to `path`.
    pub fn config(err: ConfigError, path: &std::path::Path) -> Self {
        match err {
            ConfigError::NoCredentials { account } => Self::NoCredentials { account },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config {
                path: path.display().to_string(),
                source: Box::new(other),
            },
        }
    }
}

// ── Core → CliError mapping ──────────────────────────────────────────

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Remote(obj) => Self::Remote {
                code: obj.code().into(),
                message: obj.message().into(),
            },
            SyncError::Disconnected => Self::Disconnected,
            other @ SyncError::MissingType => Self::Validation {
                field: "type".into(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<PersistError> for CliError {
    fn from(err: PersistError) -> Self {
        Self::StateFile(err)
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<HostError> for CliError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Store(e) => e.into(),
            HostError::Persist(e) => e.into(),
            HostError::Sync(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tether_core::ErrorObject;

    use super::*;

    #[test]
    fn remote_errors_keep_code_and_message() {
        let err = CliError::from(SyncError::Remote(ErrorObject::unknown("boom")));
        assert_eq!(err.to_string(), "Command failed (error/unknown): boom");
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn disconnect_maps_to_connection_exit_code() {
        let err = CliError::from(HostError::Sync(SyncError::Disconnected));
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn config_credentials_error_maps_to_auth() {
        let err = CliError::config(
            ConfigError::NoCredentials {
                account: "ada@example.com".into(),
            },
            std::path::Path::new("/tmp/config.toml"),
        );
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
