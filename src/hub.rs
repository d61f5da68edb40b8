//! Message hub
//!
//! The hub wires the ports together and exposes the whole surface: typed
//! send and read on the storage side, callback and stream subscription on
//! the delivery side. One hub per process per container is the expected
//! shape, but nothing enforces it; hubs are independent.
//!
//! Internally the hub owns the dispatcher task that serializes fan-out:
//! raw signals land on an unbounded channel (from whatever thread the
//! broadcast port delivers on) and are drained here one at a time, which
//! keeps per-key delivery in arrival order without ever mutating registry
//! state from a foreign callback.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcast::{Broadcast, LocalBroadcast};
use crate::codec;
use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::registry::{DeliverFn, DispatchRegistry, SlotKey, SlotStats, SubscriptionToken};
use crate::router::SignalRouter;
use crate::storage::{MemoryStore, Store};
use crate::stream::ValueStream;

/// Cross-process message hub over a shared storage container
pub struct Hub {
    router: Arc<SignalRouter>,
    registry: Arc<DispatchRegistry>,
    store: Arc<dyn Store>,
    dispatcher: JoinHandle<()>,
}

impl Hub {
    /// Create a hub over the given storage and broadcast ports
    ///
    /// Spawns the dispatcher task; the hub must be created inside a tokio
    /// runtime. Configuration problems fail here and are never retried.
    pub fn new(
        config: HubConfig,
        store: Arc<dyn Store>,
        broadcast: Arc<dyn Broadcast>,
    ) -> Result<Self> {
        config.validate()?;

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<String>();
        let router = Arc::new(SignalRouter::new(&config.namespace, broadcast, signal_tx));
        let registry = Arc::new(DispatchRegistry::new(store.clone()));

        let dispatcher = {
            let router = router.clone();
            let registry = registry.clone();
            tokio::spawn(async move {
                while let Some(name) = signal_rx.recv().await {
                    if let Some(key) = router.route(&name) {
                        registry.fan_out(&key).await;
                    }
                }
            })
        };

        tracing::info!(namespace = %config.namespace, "Hub started");

        Ok(Self {
            router,
            registry,
            store,
            dispatcher,
        })
    }

    /// Create a hub over an in-process store and a private broadcast bus
    ///
    /// Nothing crosses a process boundary; useful for tests and for using
    /// the pub/sub surface inside a single process.
    pub fn in_memory(namespace: impl Into<String>) -> Result<Self> {
        Self::new(
            HubConfig::new(namespace),
            Arc::new(MemoryStore::new()),
            Arc::new(LocalBroadcast::new()),
        )
    }

    /// Encode and store a value for a key, then signal the change
    ///
    /// The previous value, if any, is replaced; nothing is versioned.
    pub async fn send<T: Serialize>(&self, key: impl Into<SlotKey>, value: &T) -> Result<()> {
        let key = key.into();
        let bytes = codec::encode(value).map_err(Error::Encode)?;

        self.store.write(key.as_str(), bytes).await?;
        self.router.publish(&key);

        Ok(())
    }

    /// Signal a change for a key without writing
    ///
    /// For producers that wrote to the container through some other path.
    pub fn signal(&self, key: impl Into<SlotKey>) {
        self.router.publish(&key.into());
    }

    /// Read the currently stored blob for a key
    pub async fn read_current(&self, key: impl Into<SlotKey>) -> Result<Option<Bytes>> {
        self.store.read(key.into().as_str()).await
    }

    /// Read and decode the currently stored value for a key
    pub async fn read_current_as<T: DeserializeOwned>(
        &self,
        key: impl Into<SlotKey>,
    ) -> Result<Option<T>> {
        match self.read_current(key).await? {
            Some(bytes) => codec::decode(&bytes).map(Some).map_err(Error::Decode),
            None => Ok(None),
        }
    }

    /// Register a callback invoked with each subsequently published value
    ///
    /// The handler runs on the dispatcher task and must not block. A stored
    /// value that fails to decode into `T` is dropped for this subscription
    /// only; the subscription stays live for the next value. Fails if the
    /// broadcast port refuses the key's registration, in which case no
    /// subscription is created.
    pub fn subscribe<T, F>(&self, key: impl Into<SlotKey>, handler: F) -> Result<SubscriptionToken>
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let key = key.into();
        self.router.ensure_observed(&key)?;

        let log_key = key.clone();
        let deliver: DeliverFn = Arc::new(move |bytes: &Bytes| match codec::decode::<T>(bytes) {
            Ok(value) => handler(value),
            Err(e) => {
                tracing::warn!(
                    key = %log_key,
                    error = %e,
                    "Dropping payload a callback subscription could not decode"
                );
            }
        });

        Ok(self.registry.add_callback(key, deliver))
    }

    /// Remove a callback subscription
    ///
    /// Idempotent: an unknown or already-removed token is a no-op, since
    /// double-release races are expected under concurrent cancellation.
    pub fn unsubscribe(&self, token: &SubscriptionToken) {
        if self.registry.remove_callback(token) {
            self.router.release_observation(&token.key);
        }
    }

    /// Open an independent stream of subsequently published values
    ///
    /// Every `open_stream` call gets its own subscription; concurrent
    /// streams on one key each see every value. The subscription ends when
    /// the returned stream is dropped or closed.
    pub fn open_stream<T>(&self, key: impl Into<SlotKey>) -> Result<ValueStream<T>> {
        let key = key.into();
        self.router.ensure_observed(&key)?;

        let (handle, rx) = self.registry.add_stream(key);
        Ok(ValueStream::new(
            rx,
            handle,
            self.registry.clone(),
            self.router.clone(),
        ))
    }

    /// Delete the stored value for a key
    ///
    /// Subscriptions are untouched; an absent key is not an error.
    pub async fn clear(&self, key: impl Into<SlotKey>) -> Result<()> {
        self.store.delete(key.into().as_str()).await
    }

    /// Delete every stored value in the container
    pub async fn clear_all(&self) -> Result<()> {
        self.store.delete_all().await
    }

    /// Subscription counts for a key, or None if it has no live subscriptions
    pub fn slot_stats(&self, key: impl Into<SlotKey>) -> Option<SlotStats> {
        let key = key.into();
        let (callback_count, stream_count) = self.registry.slot_counts(&key)?;

        Some(SlotStats {
            callback_count,
            stream_count,
            observed: self.router.is_observed(&key),
        })
    }

    /// Number of keys this process currently observes
    pub fn observed_key_count(&self) -> usize {
        self.router.observed_count()
    }

    /// Stop the dispatcher task
    ///
    /// Existing subscriptions stop receiving; storage operations keep
    /// working. Also performed when the hub drops.
    pub fn shutdown(&self) {
        self.dispatcher.abort();
        tracing::info!("Hub dispatcher stopped");
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
