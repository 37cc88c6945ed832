use crate::connection::{Client, ConnectionSink, ConnectionStream, Frame, Identity};
use crate::hub::Hub;
use crate::message::{now_unix, Message, MessageType};
use crate::presence::PresenceStore;
use log::*;
use std::sync::Arc;

/// Drives one connection from registration to teardown.
///
/// A session runs on its own task: it registers the client, reads frames in
/// order, dispatches each decoded event against the hub, and on any read
/// failure or closure runs the teardown path exactly once.
#[derive(Clone)]
pub struct SessionHandler {
    hub: Arc<Hub>,
    presence: Arc<dyn PresenceStore>,
}

impl SessionHandler {
    pub fn new(hub: Arc<Hub>, presence: Arc<dyn PresenceStore>) -> Self {
        Self { hub, presence }
    }

    /// Run a session over an upgraded connection until it closes.
    pub async fn run<S>(&self, sink: Box<dyn ConnectionSink>, mut stream: S)
    where
        S: ConnectionStream,
    {
        let client = self.hub.new_client(sink);

        // A rejected client has already been closed by the hub; the read loop
        // below observes that immediately and falls through to teardown.
        if let Err(e) = self.hub.register(Arc::clone(&client)).await {
            debug!("Connection {} was not admitted: {e}", client.id());
        }

        self.read_loop(&client, &mut stream).await;
        self.close(&client).await;
    }

    async fn read_loop<S>(&self, client: &Client, stream: &mut S)
    where
        S: ConnectionStream,
    {
        loop {
            let frame = tokio::select! {
                frame = stream.recv() => frame,
                _ = client.closed() => {
                    debug!("Connection {} closed locally", client.id());
                    break;
                }
            };

            match frame {
                Some(Ok(Frame::Text(text))) => self.handle_frame(client, text.as_bytes()).await,
                Some(Ok(Frame::Binary(bytes))) => self.handle_frame(client, &bytes).await,
                Some(Ok(Frame::Control)) => continue,
                Some(Err(e)) => {
                    warn!("Error reading message from client {}: {e}", client.id());
                    break;
                }
                None => {
                    debug!("Client {} hung up", client.id());
                    break;
                }
            }
        }
    }

    async fn handle_frame(&self, client: &Client, frame: &[u8]) {
        match Message::decode(frame) {
            Ok(message) => self.dispatch(client, message).await,
            Err(e) => warn!("Error parsing message from client {}: {e}", client.id()),
        }
    }

    async fn dispatch(&self, client: &Client, message: Message) {
        match message.kind {
            MessageType::Auth => self.handle_auth(client, message).await,
            MessageType::Message => self.handle_chat_message(client, message).await,
            MessageType::UserStatus => {
                info!(
                    "Status update from client {} (user {}): online={:?}",
                    client.id(),
                    client.user_id().unwrap_or_default(),
                    message.is_online()
                );
            }
            MessageType::Ping => self.reply(client, &Message::pong()).await,
            MessageType::AuthSuccess | MessageType::Pong | MessageType::Unknown => {
                warn!(
                    "Unknown message type from client {}: {}",
                    client.id(),
                    message.kind.as_str()
                );
            }
        }
    }

    // The identity is taken at face value; nothing here checks a token.
    async fn handle_auth(&self, client: &Client, message: Message) {
        // An empty id is acknowledged but never indexed, so the session stays
        // anonymous and no presence change is recorded.
        if message.user_id.is_empty() {
            warn!("Auth without user_id from client {}", client.id());
            self.reply(client, &Message::auth_success()).await;
            return;
        }

        let identity = Identity {
            user_id: message.user_id,
            username: message.username,
        };
        if !self.hub.identify(client, identity.clone()).await {
            return;
        }

        self.set_presence(&identity.user_id, true).await;
        self.hub
            .broadcast_except(
                client.id(),
                &Message::user_status(&identity.user_id, &identity.username, true),
            )
            .await;
        self.reply(client, &Message::auth_success()).await;
    }

    async fn handle_chat_message(&self, client: &Client, mut message: Message) {
        if message.timestamp == 0 {
            message.timestamp = now_unix();
        }

        // Sender fields always come from the session, never from the payload.
        let identity = client.identity().unwrap_or_default();
        message.user_id = identity.user_id;
        message.username = identity.username;

        let delivered = self.hub.broadcast_except(client.id(), &message).await;
        debug!(
            "Relayed message from {} to {delivered} connection(s)",
            client.id()
        );
    }

    async fn reply(&self, client: &Client, message: &Message) {
        if let Err(e) = client.send(message).await {
            warn!(
                "Error sending {} to client {}: {e}",
                message.kind.as_str(),
                client.id()
            );
        }
    }

    async fn set_presence(&self, user_id: &str, online: bool) {
        if let Err(e) = self.presence.set_online(user_id, online).await {
            warn!("Failed to update presence for user {user_id}: {e}");
        }
    }

    /// Teardown, entered exactly once per session.
    async fn close(&self, client: &Client) {
        if let Some(identity) = client.identity() {
            self.set_presence(&identity.user_id, false).await;
            self.hub
                .broadcast_except(
                    client.id(),
                    &Message::user_status(&identity.user_id, &identity.username, false),
                )
                .await;
        }

        self.hub.unregister(client.id()).await;
    }
}
