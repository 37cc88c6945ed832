use crate::connection::UserId;
use crate::error::Error;
use async_trait::async_trait;
use dashmap::DashMap;
use log::*;

/// Boundary to the user store that tracks whether a user is online.
///
/// Sessions call `set_online` when an identity is asserted and again when the
/// connection closes. Failures are logged by the caller and never stall the
/// hub.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), Error>;

    /// Users currently marked online, sorted by id.
    async fn online_users(&self) -> Result<Vec<UserId>, Error>;
}

/// Process-local presence table, used when no external user store is wired in.
#[derive(Debug, Default)]
pub struct InMemoryPresenceStore {
    users: DashMap<UserId, bool>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), Error> {
        self.users.insert(user_id.to_string(), online);
        debug!("User {user_id} is now {}", if online { "online" } else { "offline" });
        Ok(())
    }

    async fn online_users(&self) -> Result<Vec<UserId>, Error> {
        let mut online: Vec<UserId> = self
            .users
            .iter()
            .filter(|entry| *entry.value())
            .map(|entry| entry.key().clone())
            .collect();
        online.sort();
        Ok(online)
    }
}
