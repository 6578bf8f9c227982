// ── Core error types ──
//
// One enum per layer. Store errors come from the registry or from a
// handler, persistence errors are cloneable so one read outcome can be
// shared by every caller, sync errors describe the request/reply layer.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::model::ErrorObject;

/// Errors raised by the store registry, mutation handlers and actions.
#[derive(Debug, Error)]
pub enum StoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("Unknown mutation type: {kind}")]
    UnknownMutation { kind: String },

    #[error("Unknown command type: {kind}")]
    UnknownCommand { kind: String },

    #[error("Duplicate registration: {kind}")]
    DuplicateRegistration { kind: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("State of module '{module}' is malformed: {source}")]
    InvalidState {
        module: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Replacement state must be a JSON object")]
    InvalidRoot,

    // ── Command errors ───────────────────────────────────────────────
    /// A command refused the request with a domain error object.
    #[error("{}", .0.message())]
    Rejected(ErrorObject),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },
}

impl StoreError {
    /// Convert into the serializable form that crosses the channel.
    ///
    /// Domain rejections keep their own object; everything else becomes
    /// `error/unknown` carrying the display message.
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            Self::Rejected(obj) => obj.clone(),
            other => ErrorObject::unknown(other.to_string()),
        }
    }
}

/// Errors from reading or writing the persisted snapshot.
#[derive(Debug, Clone, Error)]
pub enum PersistError {
    #[error("Failed to read state file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("State file {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("Failed to write state file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(Arc<serde_json::Error>),

    #[error("State file {} could not be restored: {message}", .path.display())]
    Restore { path: PathBuf, message: String },
}

impl PersistError {
    /// `true` when the snapshot exists but could not be parsed.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// The snapshot file involved, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Read { path, .. }
            | Self::Parse { path, .. }
            | Self::Write { path, .. }
            | Self::Restore { path, .. } => Some(path),
            Self::Serialize(_) => None,
        }
    }
}

/// Errors surfaced by either end of the sync protocol.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The privileged side answered the request with an error.
    #[error("Remote command failed: {}", .0.message())]
    Remote(ErrorObject),

    #[error("Channel closed")]
    Disconnected,

    #[error("Command object must carry a string `type` field")]
    MissingType,
}

/// Errors from bringing up or tearing down a [`Host`](crate::Host).
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_keeps_domain_object() {
        let obj = ErrorObject::unknown("nope");
        let err = StoreError::Rejected(obj.clone());
        assert_eq!(err.to_error_object(), obj);
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn registry_errors_become_unknown_objects() {
        let err = StoreError::UnknownCommand {
            kind: "items/nope".into(),
        };
        let obj = err.to_error_object();
        assert_eq!(obj.code(), "error/unknown");
        assert_eq!(obj.message(), "Unknown command type: items/nope");
    }

    #[test]
    fn persist_error_display_includes_path() {
        let err = PersistError::Read {
            path: PathBuf::from("/tmp/state.json"),
            source: Arc::new(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
        };
        let text = err.to_string();
        assert!(text.contains("/tmp/state.json"));
        assert!(text.contains("denied"));
        assert!(!err.is_parse());
        assert_eq!(err.path(), Some(std::path::Path::new("/tmp/state.json")));
    }

    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<StoreError>();
            assert_send_sync::<PersistError>();
            assert_send_sync::<SyncError>();
            assert_send_sync::<HostError>();
        }
    };
}
