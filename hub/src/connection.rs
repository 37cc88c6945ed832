use crate::error::{Error, ErrorKind, TransportErrorKind};
use crate::message::Message;
use async_trait::async_trait;
use log::*;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};

// Type alias for user IDs (the web layer hands us whatever the user store uses)
pub type UserId = String;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound unit read from a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Transport-level keep-alive traffic with no payload for the session.
    Control,
}

/// Write half of a live duplex connection.
#[async_trait]
pub trait ConnectionSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), Error>;

    async fn close(&mut self) -> Result<(), Error>;
}

/// Read half of a live duplex connection.
#[async_trait]
pub trait ConnectionStream: Send {
    /// Blocks until the next frame arrives. `None` means the peer closed the
    /// connection cleanly.
    async fn recv(&mut self) -> Option<Result<Frame, Error>>;
}

/// The identity a session asserted with an `auth` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Hub-side handle pairing one live connection with an optional identity.
///
/// Writes to the connection are serialized by the client's own lock so a
/// broadcast and a direct reply never interleave on the wire. The connection
/// is closed at most once no matter how many paths race to close it.
pub struct Client {
    id: ConnectionId,
    identity: RwLock<Option<Identity>>,
    sink: Mutex<Box<dyn ConnectionSink>>,
    closed: watch::Sender<bool>,
    write_timeout: Duration,
}

impl Client {
    pub fn new(sink: Box<dyn ConnectionSink>, write_timeout: Duration) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            identity: RwLock::new(None),
            sink: Mutex::new(sink),
            closed,
            write_timeout,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Snapshot of the asserted identity, `None` until the session authenticates.
    pub fn identity(&self) -> Option<Identity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.identity().map(|identity| identity.user_id)
    }

    // Only the registry calls this, under its write lock, so the user index
    // and the client's view of its identity never disagree.
    pub(crate) fn set_identity(&self, identity: Identity) {
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }

    pub async fn send(&self, message: &Message) -> Result<(), Error> {
        let text = message.encode()?;
        self.send_text(text).await
    }

    /// Writes one text frame, holding the send lock for the duration of the write.
    pub async fn send_text(&self, text: String) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::new(ErrorKind::Closed));
        }

        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.write_timeout, sink.send_text(text)).await {
            Ok(result) => result,
            Err(elapsed) => Err(Error::transport(TransportErrorKind::Timeout, elapsed)),
        }
    }

    /// Closes the underlying connection. Returns `true` only for the call that
    /// actually performed the close.
    pub async fn close(&self) -> bool {
        let first = self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if !first {
            return false;
        }

        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.write_timeout, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Error closing connection {}: {e}", self.id),
            Err(_) => debug!("Timed out closing connection {}", self.id),
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the connection has been closed by any path.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this only returns on close.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("identity", &self.identity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
