use crate::connection::{Client, ConnectionId, Identity, UserId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Outcome of asking the registry to admit a new client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// The registry is at its connection ceiling; nothing was inserted.
    Rejected,
}

/// Connection registry with dual indices for O(1) lookups.
///
/// This is a plain data structure with no interior locking. The `Hub` owns it
/// behind a single read/write lock, so every method here runs either alone
/// (`&mut self`) or alongside other readers only.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for registration/cleanup - O(1)
    connections: HashMap<ConnectionId, Arc<Client>>,

    /// Secondary index: authenticated user_id to that user's connections - O(1)
    user_index: HashMap<UserId, HashSet<ConnectionId>>,

    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            user_index: HashMap::new(),
            max_connections,
        }
    }

    /// Number of admitted connections. Always equal to the size of the map.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Insert a client unless the ceiling has been reached - O(1)
    pub fn admit(&mut self, client: Arc<Client>) -> Admission {
        if self.connections.contains_key(client.id()) {
            return Admission::Admitted;
        }
        if self.connections.len() >= self.max_connections {
            return Admission::Rejected;
        }

        if let Some(user_id) = client.user_id() {
            self.index_user(user_id, client.id().clone());
        }
        self.connections.insert(client.id().clone(), client);
        Admission::Admitted
    }

    /// Remove a connection, returning it if it was present - O(1)
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Arc<Client>> {
        let client = self.connections.remove(connection_id)?;
        if let Some(user_id) = client.user_id() {
            self.unindex_user(&user_id, connection_id);
        }
        Some(client)
    }

    /// Record the identity a registered connection asserted.
    ///
    /// Re-authentication replaces the previous identity and moves the
    /// connection to the new user's index entry. Returns `false` if the
    /// connection is not registered.
    pub fn bind_identity(&mut self, connection_id: &ConnectionId, identity: Identity) -> bool {
        let Some(client) = self.connections.get(connection_id).cloned() else {
            return false;
        };

        if let Some(previous) = client.user_id() {
            self.unindex_user(&previous, connection_id);
        }
        self.index_user(identity.user_id.clone(), connection_id.clone());
        client.set_identity(identity);
        true
    }

    pub fn all(&self) -> Vec<Arc<Client>> {
        self.connections.values().cloned().collect()
    }

    pub fn all_except(&self, connection_id: &ConnectionId) -> Vec<Arc<Client>> {
        self.connections
            .iter()
            .filter(|(id, _)| *id != connection_id)
            .map(|(_, client)| Arc::clone(client))
            .collect()
    }

    /// All connections of one user - O(1) lookup + O(k) where k = user's connections
    pub fn for_user(&self, user_id: &str) -> Vec<Arc<Client>> {
        self.user_index
            .get(user_id)
            .map(|ids| self.resolve(ids.iter()))
            .unwrap_or_default()
    }

    /// Connections of every authenticated user accepted by `predicate`.
    /// Unauthenticated connections are never matched.
    pub fn matching_users<P>(&self, predicate: P) -> Vec<Arc<Client>>
    where
        P: Fn(&str) -> bool,
    {
        self.user_index
            .iter()
            .filter(|(user_id, _)| predicate(user_id))
            .flat_map(|(_, ids)| self.resolve(ids.iter()))
            .collect()
    }

    /// Distinct authenticated user ids, sorted for stable output.
    pub fn connected_users(&self) -> Vec<UserId> {
        self.user_index
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn resolve<'a>(&self, ids: impl Iterator<Item = &'a ConnectionId>) -> Vec<Arc<Client>> {
        ids.filter_map(|id| self.connections.get(id).cloned())
            .collect()
    }

    fn index_user(&mut self, user_id: UserId, connection_id: ConnectionId) {
        if user_id.is_empty() {
            return;
        }
        self.user_index
            .entry(user_id)
            .or_default()
            .insert(connection_id);
    }

    fn unindex_user(&mut self, user_id: &str, connection_id: &ConnectionId) {
        if let Some(ids) = self.user_index.get_mut(user_id) {
            ids.remove(connection_id);

            // Clean up empty user entries
            if ids.is_empty() {
                self.user_index.remove(user_id);
            }
        }
    }
}
