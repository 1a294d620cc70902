//! Adapter over the durable key-value store for the single slot that holds
//! the whole task collection.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::task::{Snapshot, Task, TaskId};
use crate::kv::{KeyValueStore, KvError};

pub mod bus;
pub mod writer;

use bus::{OriginId, StorageBus, StorageEvent};
use writer::WriteQueue;

pub const DEFAULT_SLOT: &str = "tasks";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreadable: {0}")]
    Unreadable(#[from] KvError),
    #[error("stored snapshot is corrupt: {0}")]
    CorruptSnapshot(#[from] serde_json::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(serde_json::Error),
    #[error("stored snapshot repeats task id {0}")]
    DuplicateId(TaskId),
    #[error("load was aborted before the store answered")]
    LoadAborted,
    #[error("failed to start write queue: {0}")]
    WriterSpawn(std::io::Error),
    #[error("write queue is closed")]
    WriterClosed,
}

/// Parses a slot value into a collection with unique ids.
pub fn decode_snapshot(raw: &str) -> Result<Snapshot, StoreError> {
    let snapshot: Snapshot = serde_json::from_str(raw)?;
    if let Some(id) = snapshot.duplicate_id() {
        return Err(StoreError::DuplicateId(id.clone()));
    }
    Ok(snapshot)
}

/// Everything adapters over one durable store share: the store itself, the
/// change bus and the write queue.
#[derive(Clone)]
pub struct Storage {
    kv: Arc<dyn KeyValueStore>,
    bus: StorageBus,
    writer: WriteQueue,
}

impl Storage {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let bus = StorageBus::default();
        let writer = WriteQueue::spawn(Arc::clone(&kv), bus.clone())?;
        Ok(Self { kv, bus, writer })
    }

    pub fn bus(&self) -> &StorageBus {
        &self.bus
    }

    /// Asks for changes other processes made to `key`. They reach adapters
    /// through the bus like any other external change.
    pub fn poll_external(&self, key: &str) {
        if let Err(err) = self.writer.check_external(key) {
            tracing::warn!(error = %err, "cannot poll for external changes");
        }
    }

    /// Opens an adapter on `key` with a fresh origin. It is subscribed to the
    /// bus from this point on, so nothing announced after `open` is missed.
    pub fn open(&self, key: impl Into<String>) -> TaskStore {
        let origin = Uuid::new_v4();
        TaskStore {
            kv: Arc::clone(&self.kv),
            key: key.into(),
            origin,
            bus: self.bus.clone(),
            writer: self.writer.clone(),
            inbox: self.bus.subscribe(origin),
        }
    }
}

pub struct TaskStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    origin: OriginId,
    bus: StorageBus,
    writer: WriteQueue,
    inbox: mpsc::UnboundedReceiver<StorageEvent>,
}

impl TaskStore {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the slot once every write queued so far has landed. `Ok(None)`
    /// means it was never written or holds an empty string.
    pub async fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        self.writer.flush().await?;
        let kv = Arc::clone(&self.kv);
        let key = self.key.clone();
        let raw = tokio::task::spawn_blocking(move || kv.get(&key))
            .await
            .map_err(|_| StoreError::LoadAborted)??;
        raw.as_deref()
            .filter(|raw| !raw.is_empty())
            .map(decode_snapshot)
            .transpose()
    }

    /// Queues the collection for writing and announces it to every other
    /// adapter on the bus. Returns before the write completes.
    pub fn save(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(tasks).map_err(StoreError::Encode)?;
        self.bus.publish(&StorageEvent {
            key: self.key.clone(),
            new_value: Some(raw.clone()),
            origin: self.origin,
        });
        self.writer.enqueue(&self.key, raw)
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.writer.flush().await
    }

    /// Hands every pending external change for this slot to `on_change`, in
    /// arrival order, and returns how many were delivered. A cleared or empty
    /// slot arrives as an empty snapshot; values that fail to decode are
    /// skipped.
    pub fn drain_external_changes(&mut self, mut on_change: impl FnMut(Snapshot)) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.inbox.try_recv() {
            if event.key != self.key {
                continue;
            }
            let snapshot = match event.new_value.as_deref() {
                None | Some("") => Snapshot::default(),
                Some(raw) => match decode_snapshot(raw) {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        tracing::warn!(key = %self.key, origin = %event.origin, error = %err, "ignoring undecodable external change");
                        continue;
                    }
                },
            };
            on_change(snapshot);
            applied += 1;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::kv::memory::InMemoryKv;
    use crate::kv::sqlite::SqliteKv;

    fn storage(kv: &InMemoryKv) -> Storage {
        Storage::new(Arc::new(kv.clone())).unwrap()
    }

    /// Memory slots whose writes take a while to land.
    #[derive(Default)]
    struct SlowKv(InMemoryKv);

    impl KeyValueStore for SlowKv {
        fn get(&self, key: &str) -> Result<Option<String>, KvError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
            std::thread::sleep(Duration::from_millis(100));
            self.0.set(key, value)
        }
    }

    #[tokio::test]
    async fn load_waits_for_queued_writes() {
        let shared = Storage::new(Arc::new(SlowKv::default())).unwrap();
        let early = shared.open(DEFAULT_SLOT);
        let snapshot = Snapshot::new(vec![Task::new("Important", "")]);

        early.save(snapshot.tasks()).unwrap();
        let late = shared.open(DEFAULT_SLOT);

        assert_eq!(late.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn empty_string_slot_loads_as_absent() {
        let kv = InMemoryKv::with_seed([(DEFAULT_SLOT, "")]);
        let store = storage(&kv).open(DEFAULT_SLOT);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn change_from_another_process_is_announced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let ours = Storage::new(Arc::new(SqliteKv::open(&path).unwrap())).unwrap();
        let theirs = Storage::new(Arc::new(SqliteKv::open(&path).unwrap())).unwrap();
        let mut reader = ours.open(DEFAULT_SLOT);
        let snapshot = Snapshot::new(vec![Task::new("From elsewhere", "")]);

        ours.poll_external(DEFAULT_SLOT);
        reader.flush().await.unwrap();
        reader.drain_external_changes(|_| {});

        let writer = theirs.open(DEFAULT_SLOT);
        writer.save(snapshot.tasks()).unwrap();
        writer.flush().await.unwrap();

        ours.poll_external(DEFAULT_SLOT);
        reader.flush().await.unwrap();
        let mut seen = Vec::new();
        assert_eq!(reader.drain_external_changes(|s| seen.push(s)), 1);
        assert_eq!(seen, [snapshot]);

        ours.poll_external(DEFAULT_SLOT);
        reader.flush().await.unwrap();
        assert_eq!(reader.drain_external_changes(|_| {}), 0);
    }

    #[test]
    fn encode_failure_is_not_reported_as_corruption() {
        let source = serde_json::from_str::<Snapshot>("").unwrap_err();
        let err = StoreError::Encode(source);
        assert!(err.to_string().starts_with("failed to encode snapshot"));
    }

    #[tokio::test]
    async fn empty_slot_loads_as_absent() {
        let store = storage(&InMemoryKv::default()).open(DEFAULT_SLOT);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_slot_is_reported() {
        let kv = InMemoryKv::with_seed([(DEFAULT_SLOT, "{not json")]);
        let store = storage(&kv).open(DEFAULT_SLOT);
        assert!(matches!(
            store.load().await,
            Err(StoreError::CorruptSnapshot(_))
        ));

        let dup = r#"[{"_id":"1","title":"a","description":"","status":"incomplete"},
                      {"_id":"1","title":"b","description":"","status":"complete"}]"#;
        let kv = InMemoryKv::with_seed([(DEFAULT_SLOT, dup)]);
        let store = storage(&kv).open(DEFAULT_SLOT);
        assert!(matches!(store.load().await, Err(StoreError::DuplicateId(_))));
    }

    #[tokio::test]
    async fn saved_snapshot_loads_back_after_flush() {
        let kv = InMemoryKv::default();
        let store = storage(&kv).open(DEFAULT_SLOT);
        let snapshot = Snapshot::new(vec![Task::new("Write tests", "store")]);

        store.save(snapshot.tasks()).unwrap();
        store.flush().await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn save_notifies_other_adapters_only() {
        let kv = InMemoryKv::default();
        let shared = storage(&kv);
        let mut writer = shared.open(DEFAULT_SLOT);
        let mut reader = shared.open(DEFAULT_SLOT);
        let snapshot = Snapshot::new(vec![Task::new("Sync", "")]);

        writer.save(snapshot.tasks()).unwrap();

        let mut seen = Vec::new();
        assert_eq!(reader.drain_external_changes(|s| seen.push(s)), 1);
        assert_eq!(seen, [snapshot]);
        assert_eq!(writer.drain_external_changes(|_| {}), 0);
    }

    #[test]
    fn external_changes_filter_key_and_skip_garbage() {
        let kv = InMemoryKv::default();
        let shared = storage(&kv);
        let mut store = shared.open(DEFAULT_SLOT);
        let stranger = Uuid::new_v4();
        let send = |key: &str, value: Option<&str>| {
            shared.bus().publish(&StorageEvent {
                key: key.to_string(),
                new_value: value.map(str::to_string),
                origin: stranger,
            });
        };

        send("settings", Some("[]"));
        send(DEFAULT_SLOT, Some("garbage"));
        send(DEFAULT_SLOT, None);
        send(DEFAULT_SLOT, Some(""));

        let mut seen = Vec::new();
        assert_eq!(store.drain_external_changes(|s| seen.push(s)), 2);
        assert_eq!(seen, [Snapshot::default(), Snapshot::default()]);
    }
}
