//! Event system infrastructure for the chat server.
//!
//! This crate provides the event system that enables loose coupling between
//! the request/response layer (which persists conversations and messages) and
//! infrastructure concerns like real-time fan-out over the connection hub.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all business events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Stored records are carried as serialized JSON values.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// A type alias that represents any stored record's id.
pub type Id = Uuid;

/// Domain events that represent business-level changes in the system.
/// These events are emitted after the owning operation has completed durably.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted once a chat message has been written to the message store.
    /// Triggers real-time delivery to connected clients.
    MessageStored {
        /// Conversation the message belongs to.
        conversation_id: Id,
        /// Complete serialized message record (id, content, sender, created_at, ...).
        message: Value,
        /// Author of the message.
        sender_id: Id,
        /// Display name of the author at the time of sending.
        sender_name: String,
        /// Conversation participants to notify. Empty means every connection.
        notify_user_ids: Vec<Id>,
    },
    /// Emitted when a user's session is revoked (logout, token blacklisted).
    /// Live connections for that user are closed.
    UserLoggedOut { user_id: Id },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like pushing real-time events,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Publish an event to all registered handlers, in registration order.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
