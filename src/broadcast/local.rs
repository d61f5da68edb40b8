//! In-process broadcast bus
//!
//! A process-shaped stand-in for a real cross-process notification
//! facility: a [`SignalBus`] plays the part of the kernel-side fabric, and
//! each [`LocalBroadcast`] endpoint plays the part of one process's
//! notification table. Several hubs attached to one bus (and pointed at one
//! shared store) behave like several cooperating processes, which is the
//! configuration the integration tests run.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::{Broadcast, SignalHandler};

/// Per-endpoint registration table
struct Endpoint {
    handlers: Mutex<HashMap<String, SignalHandler>>,
    /// Maximum registered names, None for unlimited
    capacity: Option<usize>,
}

/// Shared fabric that fans a posted name out to every attached endpoint
pub struct SignalBus {
    endpoints: Mutex<Vec<Weak<Endpoint>>>,
}

impl SignalBus {
    /// Create an empty bus
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: Mutex::new(Vec::new()),
        })
    }

    /// Attach a new endpoint with no registration limit
    pub fn endpoint(self: &Arc<Self>) -> LocalBroadcast {
        self.attach(None)
    }

    /// Attach a new endpoint refusing registrations beyond `capacity` names
    pub fn endpoint_with_capacity(self: &Arc<Self>, capacity: usize) -> LocalBroadcast {
        self.attach(Some(capacity))
    }

    fn attach(self: &Arc<Self>, capacity: Option<usize>) -> LocalBroadcast {
        let endpoint = Arc::new(Endpoint {
            handlers: Mutex::new(HashMap::new()),
            capacity,
        });
        self.endpoints.lock().push(Arc::downgrade(&endpoint));

        LocalBroadcast {
            endpoint,
            bus: self.clone(),
        }
    }

    /// Deliver a name to every endpoint registered for it
    fn post(&self, name: &str) {
        // Snapshot the matching handlers, pruning dropped endpoints, then
        // invoke outside the bus lock.
        let mut matched: Vec<SignalHandler> = Vec::new();
        {
            let mut endpoints = self.endpoints.lock();
            endpoints.retain(|weak| match weak.upgrade() {
                Some(endpoint) => {
                    if let Some(handler) = endpoint.handlers.lock().get(name) {
                        matched.push(handler.clone());
                    }
                    true
                }
                None => false,
            });
        }

        for handler in matched {
            handler(name);
        }
    }
}

/// One process's view of the in-process broadcast fabric
pub struct LocalBroadcast {
    endpoint: Arc<Endpoint>,
    bus: Arc<SignalBus>,
}

impl LocalBroadcast {
    /// Create a standalone endpoint on a fresh private bus
    pub fn new() -> Self {
        SignalBus::new().endpoint()
    }

    /// The bus this endpoint is attached to, for attaching more endpoints
    pub fn bus(&self) -> Arc<SignalBus> {
        self.bus.clone()
    }

    /// Number of names currently registered on this endpoint
    pub fn registration_count(&self) -> usize {
        self.endpoint.handlers.lock().len()
    }

    /// Whether a name is currently registered on this endpoint
    pub fn is_registered(&self, name: &str) -> bool {
        self.endpoint.handlers.lock().contains_key(name)
    }
}

impl Default for LocalBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcast for LocalBroadcast {
    fn register(&self, name: &str, handler: SignalHandler) -> Result<()> {
        let mut handlers = self.endpoint.handlers.lock();

        if let Some(capacity) = self.endpoint.capacity {
            if handlers.len() >= capacity && !handlers.contains_key(name) {
                return Err(Error::Broadcast(format!(
                    "registration limit reached ({})",
                    capacity
                )));
            }
        }

        handlers.insert(name.to_string(), handler);
        Ok(())
    }

    fn unregister(&self, name: &str) {
        self.endpoint.handlers.lock().remove(name);
    }

    fn post(&self, name: &str) {
        self.bus.post(name);
    }
}
