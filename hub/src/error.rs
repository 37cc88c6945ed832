//! Error types for the `hub` crate.
//!
//! Follows the same pattern as the other layers: a root `Error` struct holding an
//! `error_kind` and an optional `source` for error chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the real-time hub.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the hub.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Transport(TransportErrorKind),
    /// An inbound frame could not be decoded into a wire `Message`.
    Decode,
    /// An outbound `Message` could not be serialized.
    Encode,
    /// Admission control rejected a registration because the hub is full.
    CapacityExceeded,
    /// The external presence store failed to record a status change.
    Presence,
    /// The client's connection has already been closed.
    Closed,
}

/// Errors raised by the underlying duplex connection.
#[derive(Debug, PartialEq)]
pub enum TransportErrorKind {
    Send,
    Receive,
    Close,
    Timeout,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source<E>(error_kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }

    pub fn transport<E>(kind: TransportErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::with_source(ErrorKind::Transport(kind), source)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Hub Error: {:?} ({source})", self.error_kind),
            None => write!(f, "Hub Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
