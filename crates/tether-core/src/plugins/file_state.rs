// ── File persistence ──
//
// Read-once, write-serialized snapshot of the whole state tree. A single
// writer task drains a sequence-numbered queue; `write()` waits until the
// completed sequence catches up with the last scheduled one.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::PersistError;
use crate::store::{Store, Subscription};

/// Read and parse a JSON snapshot. A missing file yields `Ok(None)`.
pub async fn read_state<S: DeserializeOwned>(path: &Path) -> Result<Option<S>, PersistError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PersistError::Read {
                path: path.to_path_buf(),
                source: Arc::new(e),
            });
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PersistError::Parse {
            path: path.to_path_buf(),
            source: Arc::new(e),
        })
}

/// Write `state` as pretty-printed JSON, creating parent directories.
pub async fn write_state<S: Serialize + ?Sized>(path: &Path, state: &S) -> Result<(), PersistError> {
    let json =
        serde_json::to_string_pretty(state).map_err(|e| PersistError::Serialize(Arc::new(e)))?;

    let write_err = |e: io::Error| PersistError::Write {
        path: path.to_path_buf(),
        source: Arc::new(e),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, json).await.map_err(write_err)
}

type WriteJob = (u64, Arc<Value>);

/// Performs one snapshot write for the writer task.
type WriteFn =
    Arc<dyn Fn(PathBuf, Arc<Value>) -> BoxFuture<'static, Result<(), PersistError>> + Send + Sync>;

fn file_writer() -> WriteFn {
    Arc::new(|path: PathBuf, state: Arc<Value>| {
        async move { write_state(&path, &*state).await }.boxed()
    })
}

struct Attachment {
    subscription: Subscription,
    queue: mpsc::UnboundedSender<WriteJob>,
    writer: JoinHandle<()>,
}

struct FileStateInner {
    path: PathBuf,
    loaded: OnceCell<Result<Option<Arc<Value>>, PersistError>>,
    scheduled: Arc<AtomicU64>,
    completed: Arc<watch::Sender<u64>>,
    attachment: Mutex<Option<Attachment>>,
    write_fn: WriteFn,
}

/// Persistence plugin bound to one snapshot path.
///
/// Cloning yields another handle to the same plugin instance.
#[derive(Clone)]
pub struct FileState {
    inner: Arc<FileStateInner>,
}

impl FileState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_writer(path, file_writer())
    }

    fn with_writer(path: impl Into<PathBuf>, write_fn: WriteFn) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            inner: Arc::new(FileStateInner {
                path: path.into(),
                loaded: OnceCell::new(),
                scheduled: Arc::new(AtomicU64::new(0)),
                completed: Arc::new(completed),
                attachment: Mutex::new(None),
                write_fn,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Load the snapshot. The file is read at most once per instance;
    /// later and concurrent callers share the first outcome.
    pub async fn read(&self) -> Result<Option<Arc<Value>>, PersistError> {
        self.inner
            .loaded
            .get_or_init(|| async {
                let path = &self.inner.path;
                let outcome = read_state::<Value>(path).await.map(|v| v.map(Arc::new));
                match &outcome {
                    Ok(Some(_)) => debug!(path = %path.display(), "loaded persisted state"),
                    Ok(None) => debug!(path = %path.display(), "no persisted state"),
                    Err(e) => error!(error = %e, "failed to load persisted state"),
                }
                outcome
            })
            .await
            .clone()
    }

    /// Restore persisted state into `store`, then persist every mutation.
    ///
    /// Attaching an already attached plugin is a no-op.
    pub async fn attach(&self, store: &Store) -> Result<(), PersistError> {
        let mut attachment = self.inner.attachment.lock().await;
        if attachment.is_some() {
            return Ok(());
        }

        if let Some(snapshot) = self.read().await? {
            store
                .replace_state(Value::clone(&snapshot))
                .map_err(|e| PersistError::Restore {
                    path: self.inner.path.clone(),
                    message: e.to_string(),
                })?;
        }

        let (queue, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(writer_task(
            self.inner.path.clone(),
            rx,
            Arc::clone(&self.inner.completed),
            Arc::clone(&self.inner.write_fn),
        ));

        let scheduled = Arc::clone(&self.inner.scheduled);
        let completed = Arc::clone(&self.inner.completed);
        let sender = queue.clone();
        // Runs under the store's commit lock, so sequence order matches
        // queue order.
        let subscription = store.subscribe(move |_, state| {
            let seq = scheduled.fetch_add(1, Ordering::SeqCst) + 1;
            if sender.send((seq, Arc::clone(state))).is_err() {
                warn!(seq, "persistence writer stopped, dropping write");
                completed.send_replace(seq);
            }
        });

        *attachment = Some(Attachment {
            subscription,
            queue,
            writer,
        });
        debug!(path = %self.inner.path.display(), "persistence attached");
        Ok(())
    }

    /// Wait until the most recently scheduled write has finished.
    /// Failed writes count as finished; they are logged, not returned.
    pub async fn write(&self) {
        let target = self.inner.scheduled.load(Ordering::SeqCst);
        let mut rx = self.inner.completed.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|done| *done >= target).await;
    }

    pub fn scheduled_writes(&self) -> u64 {
        self.inner.scheduled.load(Ordering::SeqCst)
    }

    pub fn completed_writes(&self) -> u64 {
        *self.inner.completed.borrow()
    }

    /// Stop persisting, drain queued writes and stop the writer task.
    pub async fn close(&self) {
        let Some(attachment) = self.inner.attachment.lock().await.take() else {
            return;
        };
        attachment.subscription.unsubscribe();
        drop(attachment.queue);
        if let Err(e) = attachment.writer.await {
            error!(error = %e, "persistence writer task failed");
        }
    }
}

async fn writer_task(
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<WriteJob>,
    completed: Arc<watch::Sender<u64>>,
    write_fn: WriteFn,
) {
    // One job at a time: the next write starts only after this one settled.
    while let Some((seq, state)) = rx.recv().await {
        match write_fn(path.clone(), state).await {
            Ok(()) => debug!(seq, "state persisted"),
            Err(e) => error!(seq, error = %e, "failed to persist state"),
        }
        completed.send_replace(seq);
    }
    debug!("persistence writer stopped");
}

impl std::fmt::Debug for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileState")
            .field("path", &self.inner.path)
            .field("scheduled", &self.scheduled_writes())
            .field("completed", &self.completed_writes())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::store::Module;

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
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileState::new(dir.path().join("state.json"));
        assert_eq!(fs.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileState::new(&path).read().await.unwrap_err();
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn file_is_read_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"doc":{"title":"first"}}"#).unwrap();

        let fs = FileState::new(&path);
        let first = fs.read().await.unwrap();
        std::fs::write(&path, r#"{"doc":{"title":"second"}}"#).unwrap();
        let second = fs.read().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.unwrap()["doc"]["title"], json!("first"));
    }

    #[tokio::test]
    async fn attach_restores_then_persists_each_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        write_state(&path, &json!({"doc": {"title": "saved"}}))
            .await
            .unwrap();

        let store = store();
        let fs = FileState::new(&path);
        fs.attach(&store).await.unwrap();
        assert_eq!(store.state()["doc"]["title"], json!("saved"));

        store.commit("doc/SET", json!("one")).unwrap();
        store.commit("doc/SET", json!("two")).unwrap();
        fs.write().await;

        assert_eq!(fs.scheduled_writes(), 2);
        assert_eq!(fs.completed_writes(), 2);
        let on_disk: Value = read_state(&path).await.unwrap().unwrap();
        assert_eq!(on_disk, *store.state());
    }

    #[tokio::test]
    async fn written_file_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_state(&path, &json!({"a": {"b": 1}})).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n  \"a\": {\n    \"b\": 1\n  }\n}");
    }

    #[tokio::test]
    async fn write_with_nothing_scheduled_resolves_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileState::new(dir.path().join("state.json"));
        fs.write().await;
        assert_eq!(fs.completed_writes(), 0);
    }

    #[tokio::test]
    async fn failed_write_still_settles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let fs = FileState::new(&path);
        let store = store();
        fs.attach(&store).await.unwrap();

        // A directory cannot be overwritten with a file.
        std::fs::create_dir(&path).unwrap();
        store.commit("doc/SET", json!("x")).unwrap();
        fs.write().await;
        assert_eq!(fs.completed_writes(), 1);
    }

    #[tokio::test]
    async fn close_drains_and_detaches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = store();
        let fs = FileState::new(&path);
        fs.attach(&store).await.unwrap();
        fs.attach(&store).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);

        store.commit("doc/SET", json!("last")).unwrap();
        fs.close().await;
        assert_eq!(store.subscriber_count(), 0);

        let on_disk: Value = read_state(&path).await.unwrap().unwrap();
        assert_eq!(on_disk["doc"]["title"], json!("last"));
    }

    #[tokio::test]
    async fn writes_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let log: Arc<StdMutex<Vec<String>>> = Arc::default();

        let sink = Arc::clone(&log);
        let write_fn: WriteFn = Arc::new(move |path: PathBuf, state: Arc<Value>| {
            let sink = Arc::clone(&sink);
            async move {
                let title = state["doc"]["title"].as_str().unwrap_or_default().to_owned();
                sink.lock().unwrap().push(format!("start {title}"));
                tokio::time::sleep(Duration::from_millis(20)).await;
                let result = write_state(&path, &*state).await;
                sink.lock().unwrap().push(format!("end {title}"));
                result
            }
            .boxed()
        });

        let store = store();
        let fs = FileState::with_writer(&path, write_fn);
        fs.attach(&store).await.unwrap();

        for title in ["a", "b", "c"] {
            store.commit("doc/SET", json!(title)).unwrap();
        }
        fs.write().await;

        assert_eq!(
            *log.lock().unwrap(),
            ["start a", "end a", "start b", "end b", "start c", "end c"]
        );
        assert_eq!(fs.completed_writes(), 3);
        let on_disk: Value = read_state(&path).await.unwrap().unwrap();
        assert_eq!(on_disk["doc"]["title"], json!("c"));
    }
}
