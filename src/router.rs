//! Signal router
//!
//! Owns the per-slot broadcast observations and the mapping between slot
//! keys and the namespace-qualified names the broadcast port understands.
//! The router holds the invariant: a broadcast registration exists for a
//! key if and only if at least one live subscription references it.
//!
//! Raw signals arrive on a foreign context (whatever thread posted them).
//! The registered handler does nothing but push the raw name onto an
//! unbounded channel; the hub's dispatcher task drains that channel and
//! drives fan-out, so registry state is never mutated from the foreign
//! callback.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::broadcast::{Broadcast, SignalHandler};
use crate::error::Result;
use crate::registry::SlotKey;

/// Per-key observation bookkeeping
struct Observation {
    /// Live subscriptions depending on this registration
    refs: usize,
}

/// Reference-counted broadcast observations per slot
pub(crate) struct SignalRouter {
    /// Namespace prefix qualifying broadcast names, "{prefix}{key}"
    name_prefix: String,

    /// Broadcast port shared with every other process on the container
    port: Arc<dyn Broadcast>,

    /// Map of slot key to observation state
    observers: Mutex<HashMap<SlotKey, Observation>>,

    /// Hand-off channel into the hub's dispatcher task
    signal_tx: mpsc::UnboundedSender<String>,
}

impl SignalRouter {
    /// Create a router posting and observing under the given namespace
    pub fn new(
        namespace: &str,
        port: Arc<dyn Broadcast>,
        signal_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            name_prefix: format!("{}/", namespace),
            port,
            observers: Mutex::new(HashMap::new()),
            signal_tx,
        }
    }

    /// Broadcast name for a slot key
    fn name_for(&self, key: &SlotKey) -> String {
        format!("{}{}", self.name_prefix, key)
    }

    /// Acquire one observation reference for a key
    ///
    /// Installs the broadcast registration on the first acquisition. Safe to
    /// call concurrently for the same key; the map lock guarantees a single
    /// registration per key. A port registration failure leaves no state
    /// behind and is surfaced to the subscriber.
    pub fn ensure_observed(&self, key: &SlotKey) -> Result<()> {
        let mut observers = self.observers.lock();

        if let Some(observation) = observers.get_mut(key) {
            observation.refs += 1;
            return Ok(());
        }

        let tx = self.signal_tx.clone();
        let handler: SignalHandler = Arc::new(move |name: &str| {
            // Foreign context: enqueue only. The dispatcher may already be
            // gone during shutdown, in which case the signal is dropped.
            let _ = tx.send(name.to_string());
        });

        self.port.register(&self.name_for(key), handler)?;
        observers.insert(key.clone(), Observation { refs: 1 });

        tracing::debug!(key = %key, "Observation installed");
        Ok(())
    }

    /// Release one observation reference for a key
    ///
    /// Uninstalls the broadcast registration when the last reference goes.
    /// A key with no observation state is a no-op, never an error.
    pub fn release_observation(&self, key: &SlotKey) {
        let mut observers = self.observers.lock();

        let Some(observation) = observers.get_mut(key) else {
            return;
        };

        observation.refs -= 1;
        if observation.refs == 0 {
            observers.remove(key);
            self.port.unregister(&self.name_for(key));
            tracing::debug!(key = %key, "Observation removed");
        }
    }

    /// Post the change signal for a key
    ///
    /// Publishing needs no local subscribers; a process may only ever send.
    pub fn publish(&self, key: &SlotKey) {
        self.port.post(&self.name_for(key));
    }

    /// Map a raw signal name back to a slot key with live observation state
    ///
    /// Names outside this router's namespace, and keys whose observation was
    /// torn down while the signal was in flight, are silently dropped.
    pub fn route(&self, name: &str) -> Option<SlotKey> {
        let Some(raw_key) = name.strip_prefix(&self.name_prefix) else {
            tracing::trace!(name = name, "Ignoring signal outside namespace");
            return None;
        };

        let key = SlotKey::new(raw_key);
        if self.observers.lock().contains_key(&key) {
            Some(key)
        } else {
            tracing::trace!(key = %key, "Dropping signal for unobserved key");
            None
        }
    }

    /// Whether a key currently holds a broadcast registration
    pub fn is_observed(&self, key: &SlotKey) -> bool {
        self.observers.lock().contains_key(key)
    }

    /// Number of keys currently observed by this process
    pub fn observed_count(&self) -> usize {
        self.observers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Broadcast double recording registration traffic
    #[derive(Default)]
    struct RecordingPort {
        registered: Mutex<Vec<String>>,
        unregistered: Mutex<Vec<String>>,
        posted: Mutex<Vec<String>>,
        register_failures: AtomicUsize,
    }

    impl RecordingPort {
        fn registered_now(&self) -> usize {
            self.registered.lock().len() - self.unregistered.lock().len()
        }
    }

    impl Broadcast for RecordingPort {
        fn register(&self, name: &str, _handler: SignalHandler) -> Result<()> {
            if self.register_failures.load(Ordering::SeqCst) > 0 {
                self.register_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(crate::error::Error::Broadcast("refused".into()));
            }
            self.registered.lock().push(name.to_string());
            Ok(())
        }

        fn unregister(&self, name: &str) {
            self.unregistered.lock().push(name.to_string());
        }

        fn post(&self, name: &str) {
            self.posted.lock().push(name.to_string());
        }
    }

    fn router_with_port() -> (SignalRouter, Arc<RecordingPort>) {
        let port = Arc::new(RecordingPort::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        (SignalRouter::new("ns", port.clone(), tx), port)
    }

    #[test]
    fn test_single_registration_for_many_references() {
        let (router, port) = router_with_port();
        let key = SlotKey::new("counter");

        for _ in 0..5 {
            router.ensure_observed(&key).unwrap();
        }

        assert_eq!(port.registered.lock().as_slice(), ["ns/counter"]);
        assert!(router.is_observed(&key));
    }

    #[test]
    fn test_last_release_unregisters_once() {
        let (router, port) = router_with_port();
        let key = SlotKey::new("counter");

        for _ in 0..3 {
            router.ensure_observed(&key).unwrap();
        }
        for _ in 0..3 {
            router.release_observation(&key);
        }

        assert_eq!(port.unregistered.lock().as_slice(), ["ns/counter"]);
        assert_eq!(port.registered_now(), 0);
        assert!(!router.is_observed(&key));

        // Past the last reference: no state, no effect.
        router.release_observation(&key);
        assert_eq!(port.unregistered.lock().len(), 1);
    }

    #[test]
    fn test_failed_registration_leaves_no_state() {
        let (router, port) = router_with_port();
        port.register_failures.store(1, Ordering::SeqCst);
        let key = SlotKey::new("counter");

        assert!(router.ensure_observed(&key).is_err());
        assert!(!router.is_observed(&key));

        // The next attempt is a fresh first acquisition.
        router.ensure_observed(&key).unwrap();
        assert_eq!(port.registered_now(), 1);
    }

    #[test]
    fn test_publish_needs_no_observation() {
        let (router, port) = router_with_port();

        router.publish(&SlotKey::new("counter"));

        assert_eq!(port.posted.lock().as_slice(), ["ns/counter"]);
        assert_eq!(router.observed_count(), 0);
    }

    #[test]
    fn test_route_drops_foreign_and_unobserved_names() {
        let (router, _port) = router_with_port();
        let key = SlotKey::new("counter");
        router.ensure_observed(&key).unwrap();

        assert_eq!(router.route("ns/counter"), Some(key.clone()));
        assert_eq!(router.route("other/counter"), None);
        assert_eq!(router.route("ns/unobserved"), None);

        router.release_observation(&key);
        assert_eq!(router.route("ns/counter"), None);
    }

    #[test]
    fn test_keys_with_separator_round_trip() {
        let (router, _port) = router_with_port();
        let key = SlotKey::new("a/b");
        router.ensure_observed(&key).unwrap();

        assert_eq!(router.route("ns/a/b"), Some(key));
    }
}
