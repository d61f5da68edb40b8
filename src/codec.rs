//! Typed payload codec
//!
//! Payloads cross the storage port as opaque byte blobs; this module is the
//! single place where a blob becomes a typed value and back. JSON keeps the
//! stored container inspectable with ordinary tools, which matters when
//! several processes of different versions share it.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value into the byte blob stored for a slot
pub fn encode<T: Serialize>(value: &T) -> serde_json::Result<Bytes> {
    serde_json::to_vec(value).map(Bytes::from)
}

/// Decode a stored byte blob into a typed value
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(bytes)
}
