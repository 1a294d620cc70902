use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, oneshot};

use super::StoreError;
use super::bus::{EXTERNAL_ORIGIN, StorageBus, StorageEvent};
use crate::kv::KeyValueStore;

enum WriteJob {
    Put { key: String, value: String },
    CheckExternal { key: String },
    Flush(oneshot::Sender<()>),
}

/// Serialized write queue. Writes run on a dedicated thread strictly in the
/// order they were enqueued, so a later snapshot is never overwritten by an
/// earlier one. Clones feed the same thread. Failed writes are logged and
/// skipped.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<WriteJob>,
}

impl WriteQueue {
    pub fn spawn(kv: Arc<dyn KeyValueStore>, bus: StorageBus) -> Result<Self, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("yarukoto-writer".to_string())
            .spawn(move || drain(kv.as_ref(), &bus, rx))
            .map_err(StoreError::WriterSpawn)?;
        Ok(Self { tx })
    }

    /// Queues a check for changes another process made to the store. When
    /// there is one, the current value of `key` is announced on the bus after
    /// every write queued before this call has landed.
    pub fn check_external(&self, key: &str) -> Result<(), StoreError> {
        self.tx
            .send(WriteJob::CheckExternal {
                key: key.to_owned(),
            })
            .map_err(|_| StoreError::WriterClosed)
    }

    pub fn enqueue(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.tx
            .send(WriteJob::Put {
                key: key.to_owned(),
                value,
            })
            .map_err(|_| StoreError::WriterClosed)
    }

    /// Resolves once every write enqueued before this call has been attempted.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriteJob::Flush(ack))
            .map_err(|_| StoreError::WriterClosed)?;
        done.await.map_err(|_| StoreError::WriterClosed)
    }
}

fn drain(kv: &dyn KeyValueStore, bus: &StorageBus, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = rx.blocking_recv() {
        match job {
            WriteJob::Put { key, value } => match kv.set(&key, &value) {
                Ok(()) => tracing::debug!(%key, bytes = value.len(), "snapshot persisted"),
                Err(err) => tracing::warn!(%key, error = %err, "failed to persist snapshot"),
            },
            WriteJob::CheckExternal { key } => {
                if let Err(err) = announce_external(kv, bus, key) {
                    tracing::warn!(error = %err, "failed to check for external changes");
                }
            }
            WriteJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("write queue closed");
}

fn announce_external(
    kv: &dyn KeyValueStore,
    bus: &StorageBus,
    key: String,
) -> Result<(), crate::kv::KvError> {
    if !kv.take_external_change()? {
        return Ok(());
    }
    let new_value = kv.get(&key)?;
    tracing::debug!(%key, "store changed by another process");
    bus.publish(&StorageEvent {
        key,
        new_value,
        origin: EXTERNAL_ORIGIN,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use rusqlite::ffi;

    use super::*;
    use crate::kv::KvError;
    use crate::kv::memory::InMemoryKv;

    #[derive(Default)]
    struct RecordingKv {
        writes: Mutex<Vec<String>>,
        changed_elsewhere: Mutex<bool>,
    }

    impl KeyValueStore for RecordingKv {
        fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Ok(self.writes.lock().last().cloned())
        }

        fn set(&self, _key: &str, value: &str) -> Result<(), KvError> {
            if value == "reject" {
                return Err(KvError::Sqlite(rusqlite::Error::SqliteFailure(
                    ffi::Error::new(ffi::SQLITE_FULL),
                    None,
                )));
            }
            self.writes.lock().push(value.to_owned());
            Ok(())
        }

        fn take_external_change(&self) -> Result<bool, KvError> {
            Ok(std::mem::take(&mut *self.changed_elsewhere.lock()))
        }
    }

    #[tokio::test]
    async fn writes_land_in_enqueue_order() {
        let kv = Arc::new(RecordingKv::default());
        let queue = WriteQueue::spawn(kv.clone(), StorageBus::default()).unwrap();

        for n in 0..50 {
            queue.enqueue("tasks", n.to_string()).unwrap();
        }
        queue.flush().await.unwrap();

        let expected: Vec<String> = (0..50).map(|n| n.to_string()).collect();
        assert_eq!(*kv.writes.lock(), expected);
    }

    #[tokio::test]
    async fn failed_write_does_not_stop_the_queue() {
        let kv = Arc::new(RecordingKv::default());
        let queue = WriteQueue::spawn(kv.clone(), StorageBus::default()).unwrap();

        queue.enqueue("tasks", "first".to_string()).unwrap();
        queue.enqueue("tasks", "reject".to_string()).unwrap();
        queue.enqueue("tasks", "third".to_string()).unwrap();
        queue.flush().await.unwrap();

        assert_eq!(*kv.writes.lock(), ["first", "third"]);
    }

    #[tokio::test]
    async fn flush_makes_value_readable() {
        let kv = InMemoryKv::default();
        let queue = WriteQueue::spawn(Arc::new(kv.clone()), StorageBus::default()).unwrap();

        queue.enqueue("tasks", "[]".to_string()).unwrap();
        queue.flush().await.unwrap();

        assert_eq!(kv.get("tasks").unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn external_change_is_announced_after_earlier_writes() {
        let kv = Arc::new(RecordingKv::default());
        let bus = StorageBus::default();
        let mut inbox = bus.subscribe(uuid::Uuid::new_v4());
        let queue = WriteQueue::spawn(kv.clone(), bus).unwrap();

        queue.enqueue("tasks", "local".to_string()).unwrap();
        *kv.changed_elsewhere.lock() = true;
        queue.check_external("tasks").unwrap();
        queue.check_external("tasks").unwrap();
        queue.flush().await.unwrap();

        let event = inbox.try_recv().unwrap();
        assert_eq!(event.origin, EXTERNAL_ORIGIN);
        assert_eq!(event.new_value.as_deref(), Some("local"));
        assert!(inbox.try_recv().is_err());
    }
}
