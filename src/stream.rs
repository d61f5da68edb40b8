//! Pull-based value streams
//!
//! The stream adapter bridges push-style fan-out to pull-style consumption.
//! Each open stream owns one single-slot sink inside the registry; the
//! consumer suspends in [`ValueStream::recv`] until the next fan-out lands,
//! then decodes lazily on its own task. If fan-outs outpace the consumer,
//! intermediate values are overwritten — the slot holds no history, and
//! neither does its stream.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::codec;
use crate::registry::{DispatchRegistry, SlotKey, StreamHandle};
use crate::router::SignalRouter;

/// Terminal outcomes of a value stream
#[derive(Debug)]
pub enum StreamError {
    /// The stored value could not be decoded into the stream's type;
    /// the stream is closed and no further values will be produced
    Decode(serde_json::Error),
    /// The stream was closed (consumer side or hub teardown)
    Closed,
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Decode(e) => write!(f, "Stream payload decode failure: {}", e),
            StreamError::Closed => write!(f, "Stream closed"),
        }
    }
}

impl std::error::Error for StreamError {}

/// Lazily-produced sequence of decoded values for one slot
///
/// Obtained from `Hub::open_stream`. Two streams opened on the same key are
/// fully independent: each sees every value published after it was opened.
/// The sequence never ends on its own; it stops when the consumer drops or
/// closes it, or terminally on a decode failure.
pub struct ValueStream<T> {
    rx: watch::Receiver<Option<Bytes>>,
    handle: StreamHandle,
    registry: Arc<DispatchRegistry>,
    router: Arc<SignalRouter>,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValueStream<T> {
    pub(crate) fn new(
        rx: watch::Receiver<Option<Bytes>>,
        handle: StreamHandle,
        registry: Arc<DispatchRegistry>,
        router: Arc<SignalRouter>,
    ) -> Self {
        Self {
            rx,
            handle,
            registry,
            router,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// The slot this stream listens on
    pub fn key(&self) -> &SlotKey {
        self.handle.key()
    }

    /// Close the stream, releasing its subscription immediately
    ///
    /// Dropping the stream has the same effect; this form just makes the
    /// intent visible at the call site.
    pub fn close(self) {
        // Removal happens in Drop.
    }

    /// Remove the backing subscription and release its observation reference
    ///
    /// Idempotent across the close/drop/decode-failure paths: only the call
    /// that actually removed the subscription releases the reference.
    fn shutdown_subscription(&mut self) {
        if self.registry.remove_stream(&self.handle) {
            self.router.release_observation(self.handle.key());
        }
    }
}

impl<T: DeserializeOwned> ValueStream<T> {
    /// Wait for the next published value
    ///
    /// Suspends until a fan-out pushes a value, then decodes it. Returns
    /// `StreamError::Decode` terminally if the stored value does not fit
    /// `T`, and `StreamError::Closed` after the stream has ended.
    pub async fn recv(&mut self) -> Result<T, StreamError> {
        loop {
            if self.finished {
                return Err(StreamError::Closed);
            }

            if self.rx.changed().await.is_err() {
                self.finished = true;
                self.shutdown_subscription();
                return Err(StreamError::Closed);
            }

            let bytes = match self.rx.borrow_and_update().clone() {
                Some(bytes) => bytes,
                None => continue,
            };

            match codec::decode::<T>(&bytes) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        key = %self.handle.key(),
                        error = %e,
                        "Stream payload failed to decode, closing stream"
                    );
                    self.finished = true;
                    self.shutdown_subscription();
                    return Err(StreamError::Decode(e));
                }
            }
        }
    }
}

impl<T> Drop for ValueStream<T> {
    fn drop(&mut self) {
        self.shutdown_subscription();
    }
}
