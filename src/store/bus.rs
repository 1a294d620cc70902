use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifies one live store adapter, so its own announcements are not
/// delivered back to it.
pub type OriginId = Uuid;

/// Origin of changes made by another process. No adapter is opened with it.
pub const EXTERNAL_ORIGIN: OriginId = Uuid::nil();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the slot was cleared.
    pub new_value: Option<String>,
    pub origin: OriginId,
}

struct Subscriber {
    origin: OriginId,
    tx: mpsc::UnboundedSender<StorageEvent>,
}

/// Process-wide change channel shared by every adapter over the same store.
#[derive(Clone, Default)]
pub struct StorageBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl StorageBus {
    pub fn subscribe(&self, origin: OriginId) -> mpsc::UnboundedReceiver<StorageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber { origin, tx });
        rx
    }

    /// Delivers `event` to every subscriber except its originator and
    /// returns how many received it. Dropped receivers are pruned.
    pub fn publish(&self, event: &StorageEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for sub in subscribers.iter().filter(|s| s.origin != event.origin) {
            if sub.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::debug!(key = %event.key, origin = %event.origin, delivered, "storage change published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(origin: OriginId, value: &str) -> StorageEvent {
        StorageEvent {
            key: "tasks".to_string(),
            new_value: Some(value.to_string()),
            origin,
        }
    }

    #[test]
    fn originator_does_not_hear_itself() {
        let bus = StorageBus::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = bus.subscribe(a);
        let mut rx_b = bus.subscribe(b);

        assert_eq!(bus.publish(&event(a, "[]")), 1);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), event(a, "[]"));
    }

    #[test]
    fn events_arrive_in_publish_order() {
        let bus = StorageBus::default();
        let writer = Uuid::new_v4();
        let mut rx = bus.subscribe(Uuid::new_v4());

        bus.publish(&event(writer, "[1]"));
        bus.publish(&event(writer, "[2]"));

        assert_eq!(rx.try_recv().unwrap().new_value.as_deref(), Some("[1]"));
        assert_eq!(rx.try_recv().unwrap().new_value.as_deref(), Some("[2]"));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = StorageBus::default();
        let rx = bus.subscribe(Uuid::new_v4());
        let _kept = bus.subscribe(Uuid::new_v4());
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(&event(Uuid::new_v4(), "[]")), 1);
    }
}
