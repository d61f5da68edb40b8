//! Cross-process message slots over shared storage
//!
//! `pigeonhole` lets independent processes that share a storage container
//! exchange small, typed payloads and learn as soon as possible when a new
//! payload for a key has been published, without polling. Producers write a
//! value and post a payload-less, name-keyed broadcast signal; consumers in
//! any process re-read the container when the signal arrives.
//!
//! Each key holds at most one value; a new value overwrites the previous
//! one. Delivery of signals is best-effort: last-writer-wins on the stored
//! value is the only guarantee, so a consumer that misses a signal still
//! converges on the latest value at the next one.
//!
//! # Consuming
//!
//! Two idioms over the same underlying per-key observation:
//!
//! ```no_run
//! # async fn demo() -> pigeonhole::Result<()> {
//! let hub = pigeonhole::Hub::in_memory("myapp")?;
//!
//! // Callback: synchronous handler invoked per published value
//! let token = hub.subscribe("job-status", |status: String| {
//!     println!("status now {status}");
//! })?;
//!
//! // Stream: pull values at the consumer's own pace
//! let mut stream = hub.open_stream::<String>("job-status")?;
//! hub.send("job-status", &"running".to_string()).await?;
//! let _status = stream.recv().await;
//!
//! hub.unsubscribe(&token);
//! # Ok(())
//! # }
//! ```
//!
//! The broadcast registration for a key is installed when its first
//! subscription appears and removed when its last one goes, regardless of
//! how the subscriptions are mixed between the two idioms.

pub mod broadcast;
pub mod codec;
pub mod config;
pub mod error;
pub mod hub;
pub mod registry;
pub mod storage;
pub mod stream;

mod router;

pub use broadcast::{Broadcast, LocalBroadcast, SignalBus, SignalHandler};
pub use config::HubConfig;
pub use error::{Error, Result};
pub use hub::Hub;
pub use registry::{SlotKey, SlotStats, StreamHandle, SubscriptionToken};
pub use storage::{FileStore, LockedFileStore, MemoryStore, Store};
pub use stream::{StreamError, ValueStream};
