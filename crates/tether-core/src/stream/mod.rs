// ── Reactive state streams ──
//
// Snapshot subscriptions over the whole state tree.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A subscription to the state tree.
///
/// Holds the snapshot taken when it was created and can wait for newer
/// ones via [`changed`](Self::changed) or by converting to a `Stream`.
/// Intermediate snapshots may be skipped when several changes land
/// before the consumer polls.
pub struct StateStream {
    current: Arc<Value>,
    receiver: watch::Receiver<Arc<Value>>,
}

impl StateStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Value>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    pub fn current(&self) -> &Arc<Value> {
        &self.current
    }

    /// Latest snapshot, which may be newer than [`current`](Self::current).
    pub fn latest(&self) -> Arc<Value> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Value>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Convert into a `Stream` that first yields the current snapshot.
    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct StateWatchStream {
    inner: WatchStream<Arc<Value>>,
}

impl Stream for StateWatchStream {
    type Item = Arc<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;

    use crate::store::{Module, Store};

    fn store() -> Store {
        Store::builder()
            .module(
                Module::new("doc", json!({"title": ""})).mutation("SET", |state, payload| {
                    state["title"] = payload;
                    Ok(())
                }),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn changed_yields_post_commit_snapshot() {
        let store = store();
        let mut stream = store.stream();
        assert_eq!(stream.current()["doc"]["title"], json!(""));

        store.commit("doc/SET", json!("hello")).unwrap();
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap["doc"]["title"], json!("hello"));
        assert_eq!(stream.current()["doc"]["title"], json!("hello"));
    }

    #[tokio::test]
    async fn into_stream_starts_with_current_snapshot() {
        let store = store();
        store.commit("doc/SET", json!("a")).unwrap();
        let mut stream = store.stream().into_stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first["doc"]["title"], json!("a"));
    }

    #[tokio::test]
    async fn changed_returns_none_after_store_drop() {
        let store = store();
        let mut stream = store.stream();
        drop(store);
        assert!(stream.changed().await.is_none());
    }
}
