//! Real-time connection hub.
//!
//! This crate owns every live bidirectional connection in the process and fans
//! chat, presence and control events out to them.
//!
//! # Architecture
//!
//! - **Single coordination point**: all registry mutations (register,
//!   unregister, identity binding) go through one `tokio::sync::RwLock`, so they
//!   are totally ordered. Broadcasts only take the read lock to snapshot their
//!   recipients and write outside it.
//! - **Admission control**: the hub never holds more than
//!   `HubConfig::max_connections` clients. Over the ceiling, the connection is
//!   closed immediately and never enters the registry.
//! - **Dual-index registry**: O(1) lookups both by connection id and by
//!   authenticated user id.
//! - **Per-client send lock**: writes to one connection are serialized and
//!   time-bounded, so a stalled peer cannot wedge a broadcast.
//! - **Best effort**: events are transient, at-most-once. A failed write is
//!   logged and the client's own read loop cleans it up.
//!
//! # Message Flow
//!
//! 1. The web layer upgrades `/ws` and hands both halves to `SessionHandler::run`
//! 2. The session registers a new `Client` with the `Hub`
//! 3. Inbound frames decode into `Message`s and dispatch by type:
//!    `auth`, `message`, `user_status`, `ping`
//! 4. Persisted chat messages arrive via `DomainEvent::MessageStored` and are
//!    pushed by `HubDomainEventHandler`
//! 5. On read failure or closure, the session marks the user offline, tells the
//!    other clients, and unregisters exactly once
//!
//! # Modules
//!
//! - `connection`: connection traits, `ConnectionId`, and the `Client` handle
//! - `registry`: `ConnectionRegistry` with its dual-index architecture
//! - `hub`: the `Hub` coordination point and fan-out operations
//! - `session`: per-connection protocol handler
//! - `message`: wire envelope
//! - `presence`: presence-store boundary and an in-memory implementation
//! - `domain_event_handler`: bridge from domain events to the hub

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod hub;
pub mod message;
pub mod presence;
pub(crate) mod registry;
pub mod session;

#[cfg(test)]
mod test_support;

pub use hub::{Hub, HubConfig};
pub use session::SessionHandler;
