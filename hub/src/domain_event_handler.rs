use crate::message::Message;
use crate::Hub;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Handles domain events by converting them to wire events and pushing them
/// through the hub.
///
/// The request/response layer decides who should be notified and includes
/// their IDs in the event. This handler only routes.
pub struct HubDomainEventHandler {
    hub: Arc<Hub>,
}

impl HubDomainEventHandler {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl EventHandler for HubDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::MessageStored {
                conversation_id,
                message,
                sender_id,
                sender_name,
                notify_user_ids,
            } => {
                let wire = Message::stored_message(
                    &conversation_id.to_string(),
                    &sender_id.to_string(),
                    sender_name,
                    message.clone(),
                );

                let delivered = if notify_user_ids.is_empty() {
                    self.hub.deliver_stored_message(&wire).await
                } else {
                    let participants: HashSet<String> =
                        notify_user_ids.iter().map(|id| id.to_string()).collect();
                    self.hub
                        .broadcast_to_subset(|user_id| participants.contains(user_id), &wire)
                        .await
                };

                debug!(
                    "Delivered stored message in conversation {} to {} connection(s)",
                    conversation_id, delivered
                );
            }

            DomainEvent::UserLoggedOut { user_id } => {
                debug!("Handling UserLoggedOut event for user {}", user_id);
                self.hub.disconnect_user(&user_id.to_string()).await;
            }
        }
    }
}
