use crate::connection::{Client, ConnectionId, ConnectionSink, Identity, UserId};
use crate::error::{Error, ErrorKind};
use crate::message::Message;
use crate::registry::{Admission, ConnectionRegistry};
use futures::future::join_all;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable hub settings, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Ceiling on concurrently registered connections.
    pub max_connections: usize,
    /// Upper bound on a single physical write to one connection.
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// The in-memory authority over all live real-time connections.
///
/// Registration, unregistration and identity binding take the registry's write
/// lock and are therefore totally ordered. Fan-out operations take the read
/// lock just long enough to snapshot their recipients, then write to each
/// recipient outside the lock, so one slow peer never blocks admission.
pub struct Hub {
    registry: RwLock<ConnectionRegistry>,
    config: HubConfig,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: RwLock::new(ConnectionRegistry::new(config.max_connections)),
            config,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.config.max_connections
    }

    /// Wrap a freshly upgraded connection in a client handle. The client is
    /// not visible to fan-out until it has been registered.
    pub fn new_client(&self, sink: Box<dyn ConnectionSink>) -> Arc<Client> {
        Arc::new(Client::new(sink, self.config.write_timeout))
    }

    /// Admit a client, or close its connection if the hub is full.
    pub async fn register(&self, client: Arc<Client>) -> Result<(), Error> {
        let (admission, total) = {
            let mut registry = self.registry.write().await;
            let admission = registry.admit(Arc::clone(&client));
            (admission, registry.len())
        };

        match admission {
            Admission::Admitted => {
                info!(
                    "Client connected: {} - Total: {}/{}",
                    client.id(),
                    total,
                    self.config.max_connections
                );
                Ok(())
            }
            Admission::Rejected => {
                warn!(
                    "Rejected connection {}: limit reached ({})",
                    client.id(),
                    self.config.max_connections
                );
                client.close().await;
                Err(Error::new(ErrorKind::CapacityExceeded))
            }
        }
    }

    /// Remove a client and close its connection. Unregistering an id that is
    /// not present is a no-op, so every failure path may call this freely.
    pub async fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let (removed, total) = {
            let mut registry = self.registry.write().await;
            let removed = registry.remove(connection_id);
            (removed, registry.len())
        };

        match removed {
            Some(client) => {
                client.close().await;
                info!(
                    "Client disconnected: {} (User: {}) - Total: {}",
                    connection_id,
                    client.user_id().unwrap_or_default(),
                    total
                );
                true
            }
            None => {
                trace!("Unregister of unknown connection {connection_id} ignored");
                false
            }
        }
    }

    /// Attach an asserted identity to a registered client.
    pub async fn identify(&self, client: &Client, identity: Identity) -> bool {
        let user_id = identity.user_id.clone();
        let bound = self
            .registry
            .write()
            .await
            .bind_identity(client.id(), identity);

        if bound {
            info!("Client {} authenticated as user {}", client.id(), user_id);
        } else {
            debug!(
                "Ignoring identity for unregistered connection {}",
                client.id()
            );
        }
        bound
    }

    pub async fn broadcast_all(&self, message: &Message) -> usize {
        let recipients = self.registry.read().await.all();
        self.fan_out(recipients, message).await
    }

    /// Deliver to every client except the sender, so a sender never sees its
    /// own message echoed back.
    pub async fn broadcast_except(&self, sender_id: &ConnectionId, message: &Message) -> usize {
        let recipients = self.registry.read().await.all_except(sender_id);
        self.fan_out(recipients, message).await
    }

    /// Deliver only to authenticated clients whose user id passes `predicate`,
    /// e.g. membership in a conversation's participant list.
    pub async fn broadcast_to_subset<P>(&self, predicate: P, message: &Message) -> usize
    where
        P: Fn(&str) -> bool,
    {
        let recipients = self.registry.read().await.matching_users(predicate);
        self.fan_out(recipients, message).await
    }

    /// Deliver to every connection of one user.
    pub async fn send_to_user(&self, user_id: &str, message: &Message) -> usize {
        let recipients = self.registry.read().await.for_user(user_id);
        self.fan_out(recipients, message).await
    }

    /// Push a message that the request/response layer has already persisted.
    pub async fn deliver_stored_message(&self, message: &Message) -> usize {
        debug!(
            "Delivering stored message from {} to all connections",
            message.user_id
        );
        self.broadcast_all(message).await
    }

    /// Close every connection belonging to `user_id`. Their sessions observe
    /// the closure and run their own teardown.
    pub async fn disconnect_user(&self, user_id: &str) -> usize {
        let clients = self.registry.read().await.for_user(user_id);
        let mut closed = 0;
        for client in clients {
            if client.close().await {
                closed += 1;
            }
        }
        info!("Force-closed {closed} connection(s) for user {user_id}");
        closed
    }

    pub async fn list_connected_users(&self) -> Vec<UserId> {
        self.registry.read().await.connected_users()
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.registry.read().await.contains(connection_id)
    }

    /// Write `message` to each recipient concurrently. A failed write is
    /// logged and left for that client's own read loop to clean up.
    async fn fan_out(&self, recipients: Vec<Arc<Client>>, message: &Message) -> usize {
        if recipients.is_empty() {
            return 0;
        }

        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} event: {e}", message.kind.as_str());
                return 0;
            }
        };

        let sends = recipients
            .iter()
            .filter(|client| !client.is_closed())
            .map(|client| {
                let text = text.clone();
                async move { (client, client.send_text(text).await) }
            });

        join_all(sends)
            .await
            .into_iter()
            .filter(|(client, result)| match result {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "Failed to send {} event to connection {}: {}",
                        message.kind.as_str(),
                        client.id(),
                        e
                    );
                    false
                }
            })
            .count()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::test_support::{memory_connection, stalled_sink, Peer};

    fn hub(max_connections: usize) -> Hub {
        Hub::new(HubConfig {
            max_connections,
            write_timeout: Duration::from_millis(200),
        })
    }

    async fn connect(hub: &Hub) -> (Arc<Client>, Peer) {
        let (sink, _stream, peer) = memory_connection();
        let client = hub.new_client(sink);
        hub.register(Arc::clone(&client)).await.unwrap();
        (client, peer)
    }

    async fn connect_as(hub: &Hub, user_id: &str) -> (Arc<Client>, Peer) {
        let (client, peer) = connect(hub).await;
        hub.identify(
            &client,
            Identity {
                user_id: user_id.to_string(),
                username: user_id.to_string(),
            },
        )
        .await;
        (client, peer)
    }

    fn chat(content: &str) -> Message {
        Message {
            content: content.to_string(),
            ..Message::new(MessageType::Message)
        }
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_sender() {
        let hub = hub(10);
        let (a, peer_a) = connect(&hub).await;
        let (_b, peer_b) = connect(&hub).await;
        let (_c, peer_c) = connect(&hub).await;

        let delivered = hub.broadcast_except(a.id(), &chat("hello")).await;

        assert_eq!(delivered, 2);
        assert!(peer_a.received().is_empty());
        for peer in [&peer_b, &peer_c] {
            let received = peer.received();
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].content, "hello");
        }
    }

    #[tokio::test]
    async fn test_register_at_capacity_closes_and_leaves_state_unchanged() {
        let hub = hub(2);
        let (_x, _px) = connect_as(&hub, "x").await;
        let (_y, _py) = connect_as(&hub, "y").await;

        let (sink, _stream, peer_z) = memory_connection();
        let z = hub.new_client(sink);
        let err = hub.register(Arc::clone(&z)).await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::CapacityExceeded);
        assert!(z.is_closed());
        assert_eq!(peer_z.close_count(), 1);
        assert!(!hub.is_registered(z.id()).await);
        assert_eq!(hub.connection_count().await, 2);
        assert_eq!(
            hub.list_connected_users().await,
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unregister_closes_once_and_is_idempotent() {
        let hub = hub(10);
        let (a, peer_a) = connect(&hub).await;

        assert!(hub.unregister(a.id()).await);
        assert!(!hub.unregister(a.id()).await);
        assert!(!hub.unregister(&ConnectionId::new()).await);

        assert_eq!(peer_a.close_count(), 1);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_every_connection_of_that_user_only() {
        let hub = hub(10);
        let (_a1, peer_a1) = connect_as(&hub, "alice").await;
        let (_a2, peer_a2) = connect_as(&hub, "alice").await;
        let (_b, peer_b) = connect_as(&hub, "bob").await;
        let (_anon, peer_anon) = connect(&hub).await;

        let delivered = hub.send_to_user("alice", &chat("for alice")).await;

        assert_eq!(delivered, 2);
        assert_eq!(peer_a1.received().len(), 1);
        assert_eq!(peer_a2.received().len(), 1);
        assert!(peer_b.received().is_empty());
        assert!(peer_anon.received().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_to_subset_scopes_to_participants() {
        let hub = hub(10);
        let (_a, peer_a) = connect_as(&hub, "alice").await;
        let (_b, peer_b) = connect_as(&hub, "bob").await;
        let (_c, peer_c) = connect_as(&hub, "carol").await;

        let participants = ["alice", "carol"];
        let delivered = hub
            .broadcast_to_subset(|user_id| participants.contains(&user_id), &chat("hi"))
            .await;

        assert_eq!(delivered, 2);
        assert_eq!(peer_a.received().len(), 1);
        assert!(peer_b.received().is_empty());
        assert_eq!(peer_c.received().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_abort_broadcast_or_unregister() {
        let hub = hub(10);
        let (broken, peer_broken) = connect(&hub).await;
        let (_ok, peer_ok) = connect(&hub).await;
        peer_broken.break_writes();

        let delivered = hub.broadcast_all(&chat("still delivered")).await;

        assert_eq!(delivered, 1);
        assert_eq!(peer_ok.received().len(), 1);
        assert!(hub.is_registered(broken.id()).await);
    }

    #[tokio::test]
    async fn test_stalled_peer_does_not_block_other_recipients() {
        let hub = hub(10);
        let stalled = hub.new_client(stalled_sink());
        hub.register(Arc::clone(&stalled)).await.unwrap();
        let (_ok, peer_ok) = connect(&hub).await;

        let delivered = tokio::time::timeout(
            Duration::from_secs(2),
            hub.broadcast_all(&chat("bounded")),
        )
        .await
        .expect("broadcast should finish within the write timeout");

        assert_eq!(delivered, 1);
        assert_eq!(peer_ok.received().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_skips_client_closed_after_snapshot() {
        let hub = hub(10);
        let (a, peer_a) = connect(&hub).await;
        let (_b, peer_b) = connect(&hub).await;
        a.close().await;

        let delivered = hub.broadcast_all(&chat("skip closed")).await;

        assert_eq!(delivered, 1);
        assert!(peer_a.received().is_empty());
        assert_eq!(peer_b.received().len(), 1);
    }

    #[tokio::test]
    async fn test_identify_unregistered_client_is_rejected() {
        let hub = hub(10);
        let (sink, _stream, _peer) = memory_connection();
        let stranger = hub.new_client(sink);

        let bound = hub
            .identify(
                &stranger,
                Identity {
                    user_id: "mallory".to_string(),
                    username: "Mallory".to_string(),
                },
            )
            .await;

        assert!(!bound);
        assert!(hub.list_connected_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_user_closes_all_their_connections() {
        let hub = hub(10);
        let (a1, peer_a1) = connect_as(&hub, "alice").await;
        let (a2, peer_a2) = connect_as(&hub, "alice").await;
        let (b, _peer_b) = connect_as(&hub, "bob").await;

        assert_eq!(hub.disconnect_user("alice").await, 2);

        assert!(a1.is_closed() && a2.is_closed());
        assert!(!b.is_closed());
        assert_eq!(peer_a1.close_count(), 1);
        assert_eq!(peer_a2.close_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_registration_never_exceeds_ceiling() {
        let hub = Arc::new(hub(25));
        let mut tasks = Vec::new();
        for _ in 0..100 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                let (sink, _stream, _peer) = memory_connection();
                let client = hub.new_client(sink);
                let admitted = hub.register(Arc::clone(&client)).await.is_ok();
                if admitted {
                    hub.broadcast_except(client.id(), &chat("hi")).await;
                }
                admitted
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 25);
        assert_eq!(hub.connection_count().await, 25);
    }
}
