//! Live channels for both client roles.
//!
//! Applications are keyed by their self-declared id; re-registering an id
//! replaces the previous channel. Controllers are keyed by a
//! connection-scoped id. Every entry carries the token of the connection
//! that owns it so cleanup of a stale connection cannot evict a newer one.

use std::collections::HashMap;

use ccp_protocol::Role;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::RegistryError;

/// Identifies one accepted WebSocket for the lifetime of the relay.
pub type ConnectionToken = u64;

/// What a connection's writer task puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

pub type OutboundTx = mpsc::UnboundedSender<Outbound>;

struct ChannelEntry {
    token: ConnectionToken,
    tx: OutboundTx,
}

/// Result of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    applications: HashMap<String, ChannelEntry>,
    controllers: HashMap<String, ChannelEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, role: Role) -> &HashMap<String, ChannelEntry> {
        match role {
            Role::Application => &self.applications,
            Role::Controller => &self.controllers,
        }
    }

    fn table_mut(&mut self, role: Role) -> &mut HashMap<String, ChannelEntry> {
        match role {
            Role::Application => &mut self.applications,
            Role::Controller => &mut self.controllers,
        }
    }

    /// Register or overwrite. Returns the token of a replaced connection.
    pub fn register(
        &mut self,
        role: Role,
        id: impl Into<String>,
        token: ConnectionToken,
        tx: OutboundTx,
    ) -> Option<ConnectionToken> {
        self.table_mut(role)
            .insert(id.into(), ChannelEntry { token, tx })
            .map(|old| old.token)
            .filter(|old| *old != token)
    }

    pub fn deregister(&mut self, role: Role, id: &str) -> bool {
        self.table_mut(role).remove(id).is_some()
    }

    /// Remove `id` only while it still belongs to connection `token`.
    pub fn deregister_connection(&mut self, role: Role, id: &str, token: ConnectionToken) -> bool {
        let table = self.table_mut(role);
        match table.get(id) {
            Some(entry) if entry.token == token => {
                table.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, role: Role, id: &str) -> bool {
        self.table(role).contains_key(id)
    }

    pub fn owner(&self, role: Role, id: &str) -> Option<ConnectionToken> {
        self.table(role).get(id).map(|e| e.token)
    }

    pub fn count(&self, role: Role) -> usize {
        self.table(role).len()
    }

    /// Registered ids, sorted.
    pub fn ids(&self, role: Role) -> Vec<String> {
        let mut ids: Vec<String> = self.table(role).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Non-blocking enqueue to one peer.
    pub fn send(&self, role: Role, id: &str, message: Outbound) -> Result<(), RegistryError> {
        let entry = self.table(role).get(id).ok_or_else(|| RegistryError::NotFound {
            role,
            id: id.to_string(),
        })?;
        entry.tx.send(message).map_err(|_| RegistryError::Closed {
            role,
            id: id.to_string(),
        })
    }

    /// Enqueue to every peer of `role`. Failed channels are skipped.
    pub fn broadcast(&self, role: Role, message: &Outbound) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (id, entry) in self.table(role) {
            if entry.tx.send(message.clone()).is_ok() {
                report.delivered.push(id.clone());
            } else {
                tracing::warn!(role = %role, id = %id, "Broadcast skipped closed channel");
                report.failed.push(id.clone());
            }
        }
        report.delivered.sort();
        report.failed.sort();
        report
    }
}
