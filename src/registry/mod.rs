//! Dispatch registry for per-slot fan-out
//!
//! The registry owns every live subscription and routes freshly re-read
//! stored values to them when a slot's signal arrives. Payloads travel as
//! `bytes::Bytes`, so fan-out to many subscribers reference-counts one
//! allocation instead of copying it.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<DispatchRegistry>
//!                  ┌───────────────────────────┐
//!                  │ slots: HashMap<SlotKey,   │
//!                  │   SlotEntry {             │
//!                  │     callbacks: Vec<_>,    │
//!                  │     streams:   Vec<_>,    │
//!                  │   }                       │
//!                  │ >                         │
//!                  └────────────┬──────────────┘
//!                               │ fan_out(key)
//!              ┌────────────────┼────────────────┐
//!              ▼                ▼                ▼
//!        [Callback]        [Callback]       [ValueStream]
//!        decode+invoke     decode+invoke    watch slot ──► recv().await
//! ```
//!
//! The signal that triggers `fan_out` carries no payload; the registry
//! re-reads the storage port every time, so consumers always observe the
//! latest stored value and never a stale intermediate.

pub mod entry;
pub mod handle;
pub mod store;

pub use entry::SlotStats;
pub use handle::{SlotKey, StreamHandle, SubscriptionToken};

pub(crate) use entry::DeliverFn;
pub(crate) use store::DispatchRegistry;
