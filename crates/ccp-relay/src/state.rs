use std::collections::{HashMap, VecDeque};

use ccp_protocol::{ApplicationRecord, Role};
use serde::Serialize;

use crate::config::RelayConfig;
use crate::directory::ApplicationDirectory;
use crate::registry::{ConnectionRegistry, ConnectionToken, Outbound, OutboundTx};

/// One routing decision, exposed on `/api/trace`.
#[derive(Debug, Clone, Serialize)]
pub struct RouteTraceEvent {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// `role:id` of the sender.
    pub from: String,
    /// `role:id`, `broadcast` or `relay`.
    pub to: String,
    pub message_type: String,
    pub software_id: Option<String>,
    pub correlation_id: Option<String>,
    pub outcome: String,
}

/// Health summary for `/api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub applications: usize,
    pub controllers: usize,
    pub routes: usize,
    pub uptime_secs: i64,
}

/// Correlation id -> controller connection id, oldest evicted first.
#[derive(Debug)]
pub struct RouteTable {
    routes: HashMap<String, String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl RouteTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            routes: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&mut self, correlation_id: impl Into<String>, controller_id: impl Into<String>) {
        let correlation_id = correlation_id.into();
        if self
            .routes
            .insert(correlation_id.clone(), controller_id.into())
            .is_none()
        {
            self.order.push_back(correlation_id);
        }
        while self.routes.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.routes.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn get(&self, correlation_id: &str) -> Option<&str> {
        self.routes.get(correlation_id).map(String::as_str)
    }

    /// Drop every route owned by a controller.
    pub fn remove_controller(&mut self, controller_id: &str) -> usize {
        let before = self.routes.len();
        self.routes.retain(|_, owner| owner != controller_id);
        let routes = &self.routes;
        self.order.retain(|c| routes.contains_key(c));
        before - self.routes.len()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A relay-side view of one accepted connection.
#[derive(Debug, Clone)]
pub struct Peer {
    pub role: Role,
    /// Application: its software id (may change on identify).
    /// Controller: `client_id#token`.
    pub id: String,
    pub token: ConnectionToken,
    /// Whether this application has sent `IDENTIFY_SOFTWARE` yet.
    pub identified: bool,
    pub tx: OutboundTx,
}

impl Peer {
    pub fn label(&self) -> String {
        format!("{}:{}", self.role, self.id)
    }

    /// Enqueue a frame to this peer itself.
    pub fn reply(&self, message: Outbound) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Shared relay state. Lives behind `Arc<RwLock<_>>` in the server.
pub struct RelayState {
    /// Live channels by role.
    pub registry: ConnectionRegistry,
    /// Metadata of identified applications.
    pub directory: ApplicationDirectory,
    /// Which controller asked for which correlation id.
    pub routes: RouteTable,
    /// Recent routing decisions.
    pub trace: Vec<RouteTraceEvent>,
    pub trace_capacity: usize,
    pub start_time: chrono::DateTime<chrono::Utc>,
    next_token: ConnectionToken,
}

impl RelayState {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            directory: ApplicationDirectory::new(),
            routes: RouteTable::new(config.route_capacity),
            trace: Vec::new(),
            trace_capacity: config.trace_capacity,
            start_time: chrono::Utc::now(),
            next_token: 1,
        }
    }

    /// Register a freshly accepted connection.
    pub fn connect(&mut self, role: Role, client_id: &str, tx: OutboundTx) -> Peer {
        let token = self.next_token;
        self.next_token += 1;

        let id = match role {
            Role::Application => client_id.to_string(),
            Role::Controller => format!("{client_id}#{token}"),
        };
        if let Some(replaced) = self.registry.register(role, id.clone(), token, tx.clone()) {
            tracing::warn!(role = %role, id = %id, replaced, "Connection id taken over by new connection");
        }
        tracing::info!(role = %role, id = %id, token, "Client connected");

        Peer {
            role,
            id,
            token,
            identified: false,
            tx,
        }
    }

    /// Clean up after a connection's receive loop ended.
    pub fn disconnect(&mut self, peer: &Peer) {
        let owned = self
            .registry
            .deregister_connection(peer.role, &peer.id, peer.token);
        if !owned {
            tracing::debug!(role = %peer.role, id = %peer.id, "Stale connection closed; newer owner kept");
            return;
        }
        match peer.role {
            Role::Application => {
                if self.directory.unregister(&peer.id).is_some() {
                    tracing::info!(software_id = %peer.id, "Application unregistered");
                }
            }
            Role::Controller => {
                let dropped = self.routes.remove_controller(&peer.id);
                if dropped > 0 {
                    tracing::debug!(controller = %peer.id, dropped, "Dropped routes of closed controller");
                }
            }
        }
        tracing::info!(role = %peer.role, id = %peer.id, "Client disconnected");
    }

    pub fn push_trace(&mut self, event: RouteTraceEvent) {
        if self.trace.len() >= self.trace_capacity.max(1) {
            self.trace.remove(0);
        }
        self.trace.push(event);
    }

    pub fn applications(&self) -> Vec<ApplicationRecord> {
        self.directory.list()
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            applications: self.registry.count(Role::Application),
            controllers: self.registry.count(Role::Controller),
            routes: self.routes.len(),
            uptime_secs: (chrono::Utc::now() - self.start_time).num_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_route_table_evicts_oldest() {
        let mut routes = RouteTable::new(2);
        routes.insert("c1", "agent#1");
        routes.insert("c2", "agent#1");
        routes.insert("c3", "agent#2");
        assert_eq!(routes.len(), 2);
        assert!(routes.get("c1").is_none());
        assert_eq!(routes.get("c3"), Some("agent#2"));
    }

    #[test]
    fn test_route_table_drops_controller_routes() {
        let mut routes = RouteTable::new(10);
        routes.insert("c1", "agent#1");
        routes.insert("c2", "agent#2");
        assert_eq!(routes.remove_controller("agent#1"), 1);
        assert!(routes.get("c1").is_none());
        assert_eq!(routes.get("c2"), Some("agent#2"));
    }

    #[test]
    fn test_controller_ids_are_connection_scoped() {
        let mut state = RelayState::new(&RelayConfig::default());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let a = state.connect(Role::Controller, "agent", tx1);
        let b = state.connect(Role::Controller, "agent", tx2);
        assert_ne!(a.id, b.id);
        assert_eq!(state.registry.count(Role::Controller), 2);
    }

    #[test]
    fn test_stale_disconnect_keeps_directory_entry() {
        let mut state = RelayState::new(&RelayConfig::default());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let old = state.connect(Role::Application, "shop-1", tx1);
        let _new = state.connect(Role::Application, "shop-1", tx2);
        state
            .directory
            .register(ApplicationRecord::new("shop-1", "Shop", "", vec![]));

        state.disconnect(&old);
        assert!(state.registry.contains(Role::Application, "shop-1"));
        assert!(state.directory.get("shop-1").is_some());
    }

    #[test]
    fn test_trace_is_bounded() {
        let config = RelayConfig {
            trace_capacity: 3,
            ..RelayConfig::default()
        };
        let mut state = RelayState::new(&config);
        for i in 0..5 {
            state.push_trace(RouteTraceEvent {
                timestamp: chrono::Utc::now(),
                from: "x".into(),
                to: "y".into(),
                message_type: format!("T{i}"),
                software_id: None,
                correlation_id: None,
                outcome: "ok".into(),
            });
        }
        assert_eq!(state.trace.len(), 3);
        assert_eq!(state.trace[0].message_type, "T2");
    }
}
