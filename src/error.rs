//! Crate error types
//!
//! One error enum covers the whole surface: configuration problems caught at
//! construction, storage and codec failures surfaced to the calling producer
//! or consumer, and broadcast registration failures surfaced at subscribe
//! time. Decode failures during fan-out never travel through this type; they
//! are handled locally per subscription (see the registry module).

use std::io;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hub operations
#[derive(Debug)]
pub enum Error {
    /// Invalid configuration (namespace or container path), fatal at construction
    Config(String),
    /// Storage backend failure
    Storage(io::Error),
    /// Payload could not be encoded for sending
    Encode(serde_json::Error),
    /// Stored payload could not be decoded into the requested type
    Decode(serde_json::Error),
    /// Broadcast port refused the registration
    Broadcast(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(reason) => write!(f, "Invalid configuration: {}", reason),
            Error::Storage(e) => write!(f, "Storage failure: {}", e),
            Error::Encode(e) => write!(f, "Payload encode failure: {}", e),
            Error::Decode(e) => write!(f, "Payload decode failure: {}", e),
            Error::Broadcast(reason) => write!(f, "Broadcast registration failed: {}", reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            Error::Encode(e) | Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Storage(e)
    }
}
