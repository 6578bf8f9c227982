//! Shared configuration for tether tools.
//!
//! TOML file + `TETHER_` environment overrides, account credential
//! resolution, and translation to `tether_core::HostConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tether_core::{HostConfig, LoggerOptions, MemoryAuthProvider};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for account '{account}'")]
    NoCredentials { account: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Snapshot file. Defaults to `state.json` in the platform data dir.
    pub state_path: Option<PathBuf>,

    /// Default `tracing` filter when neither `-v` nor `RUST_LOG` is set.
    pub log_level: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub logger: LoggerConfig,

    /// Accounts known to the in-process auth provider, keyed by email.
    #[serde(default)]
    pub accounts: BTreeMap<String, Account>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// Mutation logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Multi-line payloads.
    #[serde(default)]
    pub pretty: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pretty: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One sign-in account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Account {
    pub display_name: Option<String>,

    /// Plaintext password (prefer `password_env`).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "tether", "tether")
}

fn dirs_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("tether");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Snapshot path used when the config names none.
pub fn default_state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share").join("state.json"),
        |dirs| dirs.data_dir().join("state.json"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from `path` + environment.
///
/// Nested keys use a double underscore: `TETHER_LOGGER__PRETTY=true`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TETHER_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to pretty TOML at `path`, creating parent dirs.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    pub fn effective_state_path(&self) -> PathBuf {
        self.state_path.clone().unwrap_or_else(default_state_path)
    }
}

/// Build a `HostConfig`. `state_override` wins over the config file.
pub fn to_host_config(cfg: &Config, state_override: Option<&Path>) -> HostConfig {
    let state_path = state_override.map_or_else(|| cfg.effective_state_path(), Path::to_path_buf);
    let logger = cfg.logger.enabled.then_some(LoggerOptions {
        pretty: cfg.logger.pretty,
    });

    HostConfig {
        state_path: Some(state_path),
        logger,
    }
}

/// Resolve an account password: `password_env` first, then plaintext.
pub fn resolve_password(account: &Account, email: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = account.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref pw) = account.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        account: email.into(),
    })
}

/// Build the in-process auth provider from the configured accounts.
pub fn build_auth_provider(cfg: &Config) -> Result<MemoryAuthProvider, ConfigError> {
    let mut provider = MemoryAuthProvider::new();
    for (email, account) in &cfg.accounts {
        if !email.contains('@') {
            return Err(ConfigError::Validation {
                field: format!("accounts.{email}"),
                reason: "account keys must be email addresses".into(),
            });
        }
        let password = resolve_password(account, email)?;
        provider = provider.with_account(email.clone(), password, account.display_name.clone());
    }
    Ok(provider)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.defaults.output, "table");
        assert!(cfg.logger.enabled);
        assert!(!cfg.logger.pretty);
        assert!(cfg.accounts.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
state_path = "/var/lib/tether/state.json"

[logger]
pretty = true

[accounts."ada@example.com"]
display_name = "Ada"
password = "pw"
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(
            cfg.state_path.as_deref(),
            Some(Path::new("/var/lib/tether/state.json"))
        );
        assert!(cfg.logger.enabled);
        assert!(cfg.logger.pretty);
        assert_eq!(
            cfg.accounts["ada@example.com"].display_name.as_deref(),
            Some("Ada")
        );
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config {
            log_level: Some("debug".into()),
            ..Config::default()
        };
        cfg.accounts.insert(
            "ada@example.com".into(),
            Account {
                password: Some("pw".into()),
                ..Account::default()
            },
        );

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }

    #[test]
    fn host_config_honours_override_and_logger_switch() {
        let mut cfg = Config {
            state_path: Some(PathBuf::from("/from/config.json")),
            ..Config::default()
        };
        let host = to_host_config(&cfg, None);
        assert_eq!(host.state_path, Some(PathBuf::from("/from/config.json")));
        assert_eq!(host.logger, Some(LoggerOptions { pretty: false }));

        cfg.logger.enabled = false;
        let host = to_host_config(&cfg, Some(Path::new("/override.json")));
        assert_eq!(host.state_path, Some(PathBuf::from("/override.json")));
        assert_eq!(host.logger, None);
    }

    #[test]
    fn account_without_password_is_rejected() {
        let mut cfg = Config::default();
        cfg.accounts
            .insert("ada@example.com".into(), Account::default());
        let err = build_auth_provider(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { ref account } if account == "ada@example.com"));
    }

    #[test]
    fn account_key_must_be_an_email() {
        let mut cfg = Config::default();
        cfg.accounts.insert(
            "ada".into(),
            Account {
                password: Some("pw".into()),
                ..Account::default()
            },
        );
        assert!(matches!(
            build_auth_provider(&cfg),
            Err(ConfigError::Validation { .. })
        ));
    }
}
