//! Dispatch registry implementation
//!
//! The central registry that owns all live subscriptions and performs
//! fan-out when a slot's signal arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::storage::Store;

use super::entry::{CallbackSub, DeliverFn, SlotEntry, StreamSub};
use super::handle::{SlotKey, StreamHandle, SubscriptionToken};

/// Registry of live subscriptions, keyed by slot
///
/// All map mutations happen inside a narrow mutex-guarded critical section
/// with no I/O and no user code in it. Fan-out clones the delivery closures
/// and sink senders out of the lock and runs them after releasing it, so a
/// handler that re-enters the registry cannot deadlock or corrupt iteration.
pub(crate) struct DispatchRegistry {
    /// Map of slot key to live subscriptions
    slots: Mutex<HashMap<SlotKey, SlotEntry>>,

    /// Source of subscription ids, unique across both variants
    next_id: AtomicU64,

    /// Storage port re-read on every fan-out (signals carry no payload)
    store: Arc<dyn Store>,
}

impl DispatchRegistry {
    /// Create a registry backed by the given storage port
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            store,
        }
    }

    /// Store a callback subscription and return its token
    ///
    /// Observation acquisition is the caller's responsibility and must
    /// already have succeeded; this call itself cannot fail.
    pub fn add_callback(&self, key: SlotKey, deliver: DeliverFn) -> SubscriptionToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut slots = self.slots.lock();
        let entry = slots.entry(key.clone()).or_default();
        entry.callbacks.push(CallbackSub { id, deliver });

        tracing::debug!(
            key = %key,
            id = id,
            callbacks = entry.callbacks.len(),
            "Callback subscription added"
        );

        SubscriptionToken { id, key }
    }

    /// Remove the callback subscription matching the token
    ///
    /// Idempotent: an unknown or already-removed token is a no-op. Returns
    /// whether a live subscription was actually removed, so the caller can
    /// pair the observation release exactly once.
    pub fn remove_callback(&self, token: &SubscriptionToken) -> bool {
        let mut slots = self.slots.lock();

        let Some(entry) = slots.get_mut(&token.key) else {
            return false;
        };

        let before = entry.callbacks.len();
        entry.callbacks.retain(|sub| sub.id != token.id);
        let removed = entry.callbacks.len() < before;

        if entry.is_empty() {
            slots.remove(&token.key);
        }

        if removed {
            tracing::debug!(key = %token.key, id = token.id, "Callback subscription removed");
        }

        removed
    }

    /// Store a stream subscription with an empty single-slot sink
    ///
    /// Returns the handle used for removal and the receiver half of the
    /// sink, which the stream adapter pulls from.
    pub fn add_stream(&self, key: SlotKey) -> (StreamHandle, watch::Receiver<Option<Bytes>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);

        let mut slots = self.slots.lock();
        let entry = slots.entry(key.clone()).or_default();
        entry.streams.push(StreamSub {
            id,
            tx: Arc::new(tx),
        });

        tracing::debug!(
            key = %key,
            id = id,
            streams = entry.streams.len(),
            "Stream subscription added"
        );

        (StreamHandle { id, key }, rx)
    }

    /// Remove the stream subscription matching the handle
    ///
    /// Idempotent, mirroring `remove_callback`.
    pub fn remove_stream(&self, handle: &StreamHandle) -> bool {
        let mut slots = self.slots.lock();

        let Some(entry) = slots.get_mut(&handle.key) else {
            return false;
        };

        let before = entry.streams.len();
        entry.streams.retain(|sub| sub.id != handle.id);
        let removed = entry.streams.len() < before;

        if entry.is_empty() {
            slots.remove(&handle.key);
        }

        if removed {
            tracing::debug!(key = %handle.key, id = handle.id, "Stream subscription removed");
        }

        removed
    }

    /// Deliver the current stored value to every live subscription of a slot
    ///
    /// The signal carries no payload, so the stored value is re-read here.
    /// A storage read failure drops this fan-out without touching any
    /// subscription; a miss (no stored value) leaves every consumer waiting
    /// for the next signal.
    pub async fn fan_out(&self, key: &SlotKey) {
        // Snapshot the delivery targets first so a slot with no subscribers
        // skips the storage read entirely.
        let (delivers, sinks): (Vec<DeliverFn>, Vec<Arc<watch::Sender<Option<Bytes>>>>) = {
            let slots = self.slots.lock();
            match slots.get(key) {
                Some(entry) => (
                    entry.callbacks.iter().map(|sub| sub.deliver.clone()).collect(),
                    entry.streams.iter().map(|sub| sub.tx.clone()).collect(),
                ),
                None => return,
            }
        };

        let value = match self.store.read(key.as_str()).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Storage read failed during fan-out");
                return;
            }
        };

        let Some(bytes) = value else {
            tracing::debug!(key = %key, "Fan-out found no stored value, nothing delivered");
            return;
        };

        for deliver in delivers {
            deliver(&bytes);
        }

        for tx in sinks {
            // Overwrites any value the consumer has not pulled yet.
            tx.send_replace(Some(bytes.clone()));
        }
    }

    /// Subscription counts for a slot, or None if it has no live subscriptions
    pub fn slot_counts(&self, key: &SlotKey) -> Option<(usize, usize)> {
        let slots = self.slots.lock();
        slots
            .get(key)
            .map(|entry| (entry.callbacks.len(), entry.streams.len()))
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex as PlMutex;

    use crate::storage::MemoryStore;

    use super::*;

    fn registry_with_value(key: &str, value: &[u8]) -> (DispatchRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert(key, Bytes::copy_from_slice(value));
        (DispatchRegistry::new(store.clone()), store)
    }

    fn recording_deliver() -> (DeliverFn, Arc<PlMutex<Vec<Bytes>>>) {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        let deliver: DeliverFn = Arc::new(move |bytes: &Bytes| sink.lock().push(bytes.clone()));
        (deliver, seen)
    }

    #[tokio::test]
    async fn test_fan_out_delivers_to_all_callbacks() {
        let (registry, _store) = registry_with_value("counter", b"1");
        let key = SlotKey::new("counter");

        let (deliver_a, seen_a) = recording_deliver();
        let (deliver_b, seen_b) = recording_deliver();
        registry.add_callback(key.clone(), deliver_a);
        registry.add_callback(key.clone(), deliver_b);

        registry.fan_out(&key).await;

        assert_eq!(seen_a.lock().len(), 1);
        assert_eq!(seen_b.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_miss_delivers_nothing() {
        let registry = DispatchRegistry::new(Arc::new(MemoryStore::new()));
        let key = SlotKey::new("counter");

        let (deliver, seen) = recording_deliver();
        registry.add_callback(key.clone(), deliver);

        registry.fan_out(&key).await;

        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_removed_callback_not_delivered() {
        let (registry, _store) = registry_with_value("counter", b"1");
        let key = SlotKey::new("counter");

        let (deliver_a, seen_a) = recording_deliver();
        let (deliver_b, seen_b) = recording_deliver();
        let token = registry.add_callback(key.clone(), deliver_a);
        registry.add_callback(key.clone(), deliver_b);

        assert!(registry.remove_callback(&token));
        registry.fan_out(&key).await;

        assert!(seen_a.lock().is_empty());
        assert_eq!(seen_b.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_callback_idempotent() {
        let (registry, _store) = registry_with_value("counter", b"1");
        let token = registry.add_callback(SlotKey::new("counter"), recording_deliver().0);

        assert!(registry.remove_callback(&token));
        assert!(!registry.remove_callback(&token));

        let unknown = SubscriptionToken {
            id: 9999,
            key: SlotKey::new("counter"),
        };
        assert!(!registry.remove_callback(&unknown));
    }

    #[tokio::test]
    async fn test_stream_sink_keeps_latest_value_only() {
        let store = Arc::new(MemoryStore::new());
        let registry = DispatchRegistry::new(store.clone());
        let key = SlotKey::new("counter");

        let (_handle, mut rx) = registry.add_stream(key.clone());

        store.insert("counter", Bytes::from_static(b"1"));
        registry.fan_out(&key).await;
        store.insert("counter", Bytes::from_static(b"2"));
        registry.fan_out(&key).await;

        // Consumer was slow: only the latest value is waiting.
        rx.changed().await.unwrap();
        let pending = rx.borrow_and_update().clone();
        assert_eq!(pending, Some(Bytes::from_static(b"2")));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_remove_stream_idempotent() {
        let registry = DispatchRegistry::new(Arc::new(MemoryStore::new()));
        let (handle, _rx) = registry.add_stream(SlotKey::new("counter"));

        assert!(registry.remove_stream(&handle));
        assert!(!registry.remove_stream(&handle));
    }

    #[tokio::test]
    async fn test_slot_counts() {
        let registry = DispatchRegistry::new(Arc::new(MemoryStore::new()));
        let key = SlotKey::new("counter");

        assert_eq!(registry.slot_counts(&key), None);

        let token = registry.add_callback(key.clone(), recording_deliver().0);
        let (handle, _rx) = registry.add_stream(key.clone());
        assert_eq!(registry.slot_counts(&key), Some((1, 1)));

        registry.remove_callback(&token);
        registry.remove_stream(&handle);
        assert_eq!(registry.slot_counts(&key), None);
    }
}
