// ── Wire protocol ──
//
// Event shapes exchanged between a surface and the core, plus the
// in-process duplex channel that carries them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::model::ErrorObject;
use crate::store::MutationRecord;

/// Events sent from a surface to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SurfaceEvent {
    #[serde(rename = "connect")]
    Connect,

    #[serde(rename = "dispatch")]
    Dispatch(CommandRequest),
}

/// Events sent from the core to a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum CoreEvent {
    #[serde(rename = "initialState")]
    InitialState(Arc<Value>),

    #[serde(rename = "commit")]
    Commit(MutationRecord),

    #[serde(rename = "reply")]
    Reply(CommandReply),
}

impl CoreEvent {
    /// Logical channel name: `dispatch:<id>` for replies, the event tag
    /// otherwise.
    pub fn channel(&self) -> String {
        match self {
            Self::InitialState(_) => "initialState".into(),
            Self::Commit(_) => "commit".into(),
            Self::Reply(reply) => format!("dispatch:{}", reply.id),
        }
    }
}

/// A command issued by a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// Settlement of one [`CommandRequest`]. Exactly one per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub id: u64,
    pub error: Option<ErrorObject>,
    #[serde(default)]
    pub value: Value,
}

impl CommandReply {
    pub fn ok(id: u64, value: Value) -> Self {
        Self {
            id,
            error: None,
            value,
        }
    }

    pub fn err(id: u64, error: ErrorObject) -> Self {
        Self {
            id,
            error: Some(error),
            value: Value::Null,
        }
    }

    pub fn into_result(self) -> Result<Value, SyncError> {
        match self.error {
            Some(error) => Err(SyncError::Remote(error)),
            None => Ok(self.value),
        }
    }
}

/// Core half of a duplex channel.
#[derive(Debug)]
pub struct CoreEnd {
    tx: mpsc::UnboundedSender<CoreEvent>,
    rx: mpsc::UnboundedReceiver<SurfaceEvent>,
}

impl CoreEnd {
    /// Returns `false` once the surface end is gone.
    pub fn send(&self, event: CoreEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub async fn recv(&mut self) -> Option<SurfaceEvent> {
        self.rx.recv().await
    }

    pub(crate) fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<CoreEvent>,
        mpsc::UnboundedReceiver<SurfaceEvent>,
    ) {
        (self.tx, self.rx)
    }
}

/// Surface half of a duplex channel.
#[derive(Debug)]
pub struct SurfaceEnd {
    tx: mpsc::UnboundedSender<SurfaceEvent>,
    rx: mpsc::UnboundedReceiver<CoreEvent>,
}

impl SurfaceEnd {
    /// Returns `false` once the core end is gone.
    pub fn send(&self, event: SurfaceEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub async fn recv(&mut self) -> Option<CoreEvent> {
        self.rx.recv().await
    }

    pub(crate) fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<SurfaceEvent>,
        mpsc::UnboundedReceiver<CoreEvent>,
    ) {
        (self.tx, self.rx)
    }
}

/// Create a connected pair of channel ends.
pub fn channel() -> (CoreEnd, SurfaceEnd) {
    let (core_tx, surface_rx) = mpsc::unbounded_channel();
    let (surface_tx, core_rx) = mpsc::unbounded_channel();
    (
        CoreEnd {
            tx: core_tx,
            rx: core_rx,
        },
        SurfaceEnd {
            tx: surface_tx,
            rx: surface_rx,
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn dispatch_event_wire_shape() {
        let event = SurfaceEvent::Dispatch(CommandRequest {
            id: 7,
            kind: "items/add".into(),
            payload: json!({"name": "a"}),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "dispatch",
                "data": {"id": 7, "type": "items/add", "payload": {"name": "a"}}
            })
        );
    }

    #[test]
    fn connect_has_no_data() {
        assert_eq!(
            serde_json::to_value(SurfaceEvent::Connect).unwrap(),
            json!({"event": "connect"})
        );
    }

    #[test]
    fn reply_channel_carries_id() {
        let event = CoreEvent::Reply(CommandReply::ok(12, Value::Null));
        assert_eq!(event.channel(), "dispatch:12");
        assert_eq!(
            CoreEvent::Commit(MutationRecord::new("a/B", Value::Null)).channel(),
            "commit"
        );
    }

    #[test]
    fn error_reply_rejects() {
        let reply = CommandReply::err(1, ErrorObject::unknown("boom"));
        let err = reply.into_result().unwrap_err();
        assert!(matches!(err, SyncError::Remote(ref obj) if obj.message() == "boom"));
    }

    #[tokio::test]
    async fn channel_delivers_both_directions() {
        let (mut core, mut surface) = channel();
        assert!(surface.send(SurfaceEvent::Connect));
        assert_eq!(core.recv().await, Some(SurfaceEvent::Connect));

        assert!(core.send(CoreEvent::Reply(CommandReply::ok(1, json!(2)))));
        let got = surface.recv().await.unwrap();
        assert_eq!(got, CoreEvent::Reply(CommandReply::ok(1, json!(2))));

        drop(core);
        assert!(!surface.send(SurfaceEvent::Connect));
        assert_eq!(surface.recv().await, None);
    }
}
