//! Best-effort snapshot persistence.
//!
//! [`load_snapshot`] runs once at startup and degrades to an empty snapshot
//! on any failure. Saves run on a single background task owned by
//! [`SnapshotWriter`], so they never block a request and never interleave.
//!
//! ```text
//! handler ──request_save()──► command channel ──► writer task
//!                                                    │ store.snapshot()
//!                                                    │ encode + backend.write (blocking pool)
//!                                                    ▼
//!                                     SaveOutcome ──► broadcast subscribers
//! ```

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::backend::SnapshotBackend;
use crate::entry_store::EntryStore;
use crate::error::{Result, StorageError};
use crate::snapshot::{self, Snapshot};

const COMMAND_BUFFER: usize = 16;
const OUTCOME_BUFFER: usize = 64;

/// Load the stored snapshot, falling back to an empty one.
pub fn load_snapshot(backend: &dyn SnapshotBackend) -> Snapshot {
    let bytes = match backend.read() {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            info!(location = %backend.location(), "No snapshot found, starting empty");
            return Snapshot::new();
        }
        Err(e) => {
            warn!(location = %backend.location(), error = %e, "Failed to read snapshot, starting empty");
            return Snapshot::new();
        }
    };

    match snapshot::decode(&bytes) {
        Ok(snapshot) => {
            info!(
                location = %backend.location(),
                namespaces = snapshot.len(),
                "Loaded webhook snapshot"
            );
            snapshot
        }
        Err(e) => {
            warn!(location = %backend.location(), error = %e, "Ignoring malformed snapshot");
            Snapshot::new()
        }
    }
}

/// Encode and write a snapshot, returning the number of bytes written.
pub fn save_snapshot(backend: &dyn SnapshotBackend, snapshot: &Snapshot) -> Result<usize> {
    let bytes = snapshot::encode(snapshot)?;
    backend.write(&bytes)?;
    Ok(bytes.len())
}

/// Result of one completed save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Monotonic save counter, starting at 1.
    pub sequence: u64,
    /// Bytes written, or the error message.
    pub result: std::result::Result<usize, String>,
}

impl SaveOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

enum WriterCommand {
    Save,
    Flush(oneshot::Sender<SaveOutcome>),
    Shutdown(oneshot::Sender<SaveOutcome>),
}

/// Handle to the background snapshot task.
#[derive(Clone)]
pub struct SnapshotWriter {
    command_tx: mpsc::Sender<WriterCommand>,
    outcome_tx: broadcast::Sender<SaveOutcome>,
}

impl SnapshotWriter {
    /// Spawn the writer task. Must be called from within a Tokio runtime.
    pub fn start(store: Arc<EntryStore>, backend: Arc<dyn SnapshotBackend>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (outcome_tx, _) = broadcast::channel(OUTCOME_BUFFER);

        let task = WriterTask {
            store,
            backend,
            outcome_tx: outcome_tx.clone(),
            sequence: 0,
        };
        tokio::spawn(task.run(command_rx));

        Self {
            command_tx,
            outcome_tx,
        }
    }

    /// Queue a save without waiting for it.
    ///
    /// The snapshot is taken when the save runs, so a save that is already
    /// queued covers this request and a full queue is not an error.
    pub fn request_save(&self) {
        match self.command_tx.try_send(WriterCommand::Save) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Snapshot save already queued"),
            Err(TrySendError::Closed(_)) => warn!("Snapshot writer stopped, save request dropped"),
        }
    }

    /// Save now and wait for the outcome.
    pub async fn flush(&self) -> Result<SaveOutcome> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(WriterCommand::Flush(tx))
            .await
            .map_err(|_| StorageError::WriterClosed)?;
        rx.await.map_err(|_| StorageError::WriterClosed)
    }

    /// Write a final snapshot and stop the task.
    pub async fn shutdown(&self) -> Result<SaveOutcome> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(WriterCommand::Shutdown(tx))
            .await
            .map_err(|_| StorageError::WriterClosed)?;
        rx.await.map_err(|_| StorageError::WriterClosed)
    }

    /// Receive the outcome of every save completed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SaveOutcome> {
        self.outcome_tx.subscribe()
    }
}

struct WriterTask {
    store: Arc<EntryStore>,
    backend: Arc<dyn SnapshotBackend>,
    outcome_tx: broadcast::Sender<SaveOutcome>,
    sequence: u64,
}

impl WriterTask {
    async fn run(mut self, mut command_rx: mpsc::Receiver<WriterCommand>) {
        debug!(location = %self.backend.location(), "Snapshot writer started");

        while let Some(command) = command_rx.recv().await {
            let mut waiters = Vec::new();
            let mut stop = None;
            absorb(command, &mut waiters, &mut stop);

            // Requests queued while the previous save ran share one save.
            while stop.is_none() {
                match command_rx.try_recv() {
                    Ok(command) => absorb(command, &mut waiters, &mut stop),
                    Err(_) => break,
                }
            }

            let outcome = self.save().await;
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
            if let Some(stop) = stop {
                let _ = stop.send(outcome);
                break;
            }
        }

        debug!("Snapshot writer stopped");
    }

    async fn save(&mut self) -> SaveOutcome {
        let snapshot = self.store.snapshot();
        let backend = Arc::clone(&self.backend);
        let result = tokio::task::spawn_blocking(move || save_snapshot(backend.as_ref(), &snapshot))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))
            .and_then(|result| result);

        self.sequence += 1;
        let outcome = SaveOutcome {
            sequence: self.sequence,
            result: match result {
                Ok(bytes) => {
                    debug!(location = %self.backend.location(), bytes, "Snapshot saved");
                    Ok(bytes)
                }
                Err(e) => {
                    error!(location = %self.backend.location(), error = %e, "Failed to save snapshot");
                    Err(e.to_string())
                }
            },
        };

        // No subscribers is fine.
        let _ = self.outcome_tx.send(outcome.clone());
        outcome
    }
}

fn absorb(
    command: WriterCommand,
    waiters: &mut Vec<oneshot::Sender<SaveOutcome>>,
    stop: &mut Option<oneshot::Sender<SaveOutcome>>,
) {
    match command {
        WriterCommand::Save => {}
        WriterCommand::Flush(tx) => waiters.push(tx),
        WriterCommand::Shutdown(tx) => *stop = Some(tx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{JsonFileBackend, MemoryBackend};
    use crate::entry_store::DEFAULT_NAMESPACE;
    use crate::record::Headers;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    struct FailingBackend;

    impl SnapshotBackend for FailingBackend {
        fn read(&self) -> Result<Option<Vec<u8>>> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }

        fn write(&self, _bytes: &[u8]) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }

        fn location(&self) -> String {
            "failing".to_string()
        }
    }

    fn record(store: &EntryStore, namespace: &str, n: i64) {
        store.record(namespace, json!({ "n": n }), Headers::new(), "POST", "/webhook");
    }

    #[test]
    fn test_load_missing_snapshot_is_empty() {
        let temp_dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(temp_dir.path().join("webhook-data.json"));
        assert!(load_snapshot(&backend).is_empty());
    }

    #[test]
    fn test_load_malformed_snapshot_is_empty() {
        let backend = MemoryBackend::with_contents("{not json");
        assert!(load_snapshot(&backend).is_empty());
    }

    #[test]
    fn test_load_unreadable_snapshot_is_empty() {
        assert!(load_snapshot(&FailingBackend).is_empty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let temp_dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(temp_dir.path().join("data").join("webhook-data.json"));
        let store = EntryStore::default();
        record(&store, "x", 1);
        record(&store, "x", 2);
        record(&store, "y", 3);

        save_snapshot(&backend, &store.snapshot()).unwrap();
        let restored = EntryStore::from_snapshot(load_snapshot(&backend), store.capacity());

        assert_eq!(restored.snapshot(), store.snapshot());
    }

    #[test]
    fn test_load_legacy_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("webhook-data.json");
        std::fs::write(
            &path,
            r#"[{"id":"1","timestamp":"2024-01-01T00:00:00.000Z","payload":{"a":1},"headers":{},"method":"POST","url":"/webhook"}]"#,
        )
        .unwrap();

        let snapshot = load_snapshot(&JsonFileBackend::new(&path));
        let store = EntryStore::from_snapshot(snapshot, 100);

        assert_eq!(store.namespaces().into_iter().collect::<Vec<_>>(), vec![DEFAULT_NAMESPACE]);
        assert_eq!(store.list(DEFAULT_NAMESPACE)[0].payload(), &json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_writer_flush_persists_current_state() {
        let store = Arc::new(EntryStore::default());
        let backend = Arc::new(MemoryBackend::new());
        let writer = SnapshotWriter::start(store.clone(), backend.clone());

        record(&store, "x", 1);
        let outcome = writer.flush().await.unwrap();

        assert!(outcome.is_ok());
        let saved = snapshot::decode(&backend.contents().unwrap()).unwrap();
        assert_eq!(saved, store.snapshot());
    }

    #[tokio::test]
    async fn test_writer_publishes_outcomes() {
        let store = Arc::new(EntryStore::default());
        let writer = SnapshotWriter::start(store.clone(), Arc::new(MemoryBackend::new()));
        let mut outcomes = writer.subscribe();

        record(&store, "x", 1);
        writer.request_save();

        let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.is_ok());
        assert_eq!(outcome.sequence, 1);
    }

    #[tokio::test]
    async fn test_writer_coalesces_burst_of_requests() {
        let store = Arc::new(EntryStore::default());
        let backend = Arc::new(MemoryBackend::new());
        let writer = SnapshotWriter::start(store.clone(), backend.clone());

        for n in 0..100 {
            record(&store, "burst", n);
            writer.request_save();
        }
        let outcome = writer.flush().await.unwrap();

        assert!(outcome.sequence <= 101);
        let saved = snapshot::decode(&backend.contents().unwrap()).unwrap();
        assert_eq!(saved["burst"].len(), 100);
    }

    #[tokio::test]
    async fn test_failing_backend_does_not_affect_store() {
        let store = Arc::new(EntryStore::default());
        let writer = SnapshotWriter::start(store.clone(), Arc::new(FailingBackend));
        let mut outcomes = writer.subscribe();

        record(&store, "x", 1);
        writer.request_save();

        let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.is_ok());
        assert!(outcome.result.unwrap_err().contains("read-only"));

        record(&store, "x", 2);
        assert_eq!(store.count(Some("x")), 2);
    }

    #[tokio::test]
    async fn test_shutdown_writes_final_snapshot_and_stops() {
        let store = Arc::new(EntryStore::default());
        let backend = Arc::new(MemoryBackend::new());
        let writer = SnapshotWriter::start(store.clone(), backend.clone());

        record(&store, "x", 1);
        let outcome = writer.shutdown().await.unwrap();
        assert!(outcome.is_ok());
        assert!(backend.contents().is_some());

        assert!(matches!(writer.flush().await, Err(StorageError::WriterClosed)));
    }
}
