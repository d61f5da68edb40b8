//! Per-slot subscription sets
//!
//! This module defines the per-key state stored in the dispatch registry:
//! the live callback subscriptions and the live stream subscriptions. The
//! registry owns these exclusively; callers only ever hold tokens.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;

/// Type-erased delivery closure for a callback subscription
///
/// Built at subscribe time; captures the decode step for the concrete
/// payload type, so the registry never needs to know it.
pub(crate) type DeliverFn = Arc<dyn Fn(&Bytes) + Send + Sync>;

/// A live callback subscription
pub(crate) struct CallbackSub {
    /// Registry-assigned id, matched against tokens on removal
    pub id: u64,
    /// Decode-and-invoke closure, run outside the registry lock
    pub deliver: DeliverFn,
}

/// A live stream subscription
///
/// The sink is a single-slot watch channel: a fan-out that lands before the
/// consumer has pulled the previous value simply overwrites it
/// (latest-value-wins, matching the no-history guarantee of stored values).
pub(crate) struct StreamSub {
    /// Registry-assigned id, matched against handles on removal
    pub id: u64,
    /// Sender half of the single-slot sink
    pub tx: Arc<watch::Sender<Option<Bytes>>>,
}

/// Live subscriptions for one slot
#[derive(Default)]
pub(crate) struct SlotEntry {
    pub callbacks: Vec<CallbackSub>,
    pub streams: Vec<StreamSub>,
}

impl SlotEntry {
    /// True once the last subscription of either kind is gone
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty() && self.streams.is_empty()
    }
}

/// Point-in-time subscription counts for one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStats {
    /// Number of live callback subscriptions
    pub callback_count: usize,
    /// Number of live stream subscriptions
    pub stream_count: usize,
    /// Whether a broadcast observation is currently installed for the slot
    pub observed: bool,
}
