//! Broadcast port: name-keyed, payload-less signals
//!
//! The transport that tells other processes "the stored value for this name
//! may have changed". Delivery is best-effort and carries nothing but the
//! name; the receiving side re-reads the storage port for the payload.
//!
//! Handlers registered here are invoked on whatever context the posting
//! side runs on. They must hand off to their owner's serialization
//! mechanism instead of doing real work; the signal router enqueues the raw
//! name onto a channel and returns immediately.

pub mod local;

pub use local::{LocalBroadcast, SignalBus};

use std::sync::Arc;

use crate::error::Result;

/// Handler invoked when a signal for a registered name is delivered
pub type SignalHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Name-keyed, payload-less signal transport
pub trait Broadcast: Send + Sync {
    /// Register a handler for a name
    ///
    /// Registering an already-registered name replaces the previous handler.
    /// A refused registration (for example a capacity limit) is surfaced to
    /// the subscriber that triggered it.
    fn register(&self, name: &str, handler: SignalHandler) -> Result<()>;

    /// Remove the registration for a name; idempotent
    fn unregister(&self, name: &str);

    /// Post a payload-less signal to every registration for a name
    fn post(&self, name: &str);
}
