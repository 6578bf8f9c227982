use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::store::{Store, Subscription};

/// Rendering options for [`MutationLogger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerOptions {
    /// Multi-line JSON payloads instead of single-line.
    pub pretty: bool,
}

/// Emits one `info` event per applied mutation: `* <type> <payload>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationLogger {
    options: LoggerOptions,
}

impl MutationLogger {
    pub fn new(options: LoggerOptions) -> Self {
        Self { options }
    }

    pub fn install(&self, store: &Store) -> Subscription {
        let pretty = self.options.pretty;
        store.subscribe(move |record, _| {
            info!(
                target: "tether::mutation",
                "* {} {}",
                record.kind,
                render_payload(&record.payload, pretty)
            );
        })
    }
}

pub fn render_payload(payload: &Value, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
    } else {
        payload.to_string()
    }
}
