//! Connection registry: the single source of truth for who is subscribed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::connection::Connection;
use crate::errors::{HubError, Result};
use crate::types::Topic;

/// Connection counts grouped by topic and correlation id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Live connections.
    pub total: usize,
    /// Live connections per topic.
    pub by_topic: BTreeMap<Topic, usize>,
    /// Live connections per correlation id.
    pub by_correlation: BTreeMap<String, usize>,
}

/// Owns the set of live connections.
///
/// All lookups return snapshots, so callers may iterate while other tasks
/// register or deregister.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. Fails if the id is taken.
    pub fn register(&self, connection: Arc<Connection>) -> Result<()> {
        let mut conns = self.connections.write();
        if conns.contains_key(&connection.id) {
            return Err(HubError::DuplicateConnectionId(connection.id.clone()));
        }
        let _ = conns.insert(connection.id.clone(), connection);
        Ok(())
    }

    /// Remove a connection by id. Removing an absent id is a no-op.
    ///
    /// This only drops the map entry: the connection stays alive, its handler
    /// keeps running and the liveness supervisor no longer sees it. Use
    /// [`crate::hub::Hub::close`] to end a connection.
    pub fn deregister(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.write().remove(id)
    }

    /// Remove `connection` only if the registered entry is that same instance.
    pub(crate) fn deregister_instance(&self, connection: &Arc<Connection>) -> bool {
        let mut conns = self.connections.write();
        match conns.get(&connection.id) {
            Some(existing) if Arc::ptr_eq(existing, connection) => {
                let _ = conns.remove(&connection.id);
                true
            }
            _ => false,
        }
    }

    /// Look up a connection.
    pub fn get(&self, id: &str) -> Result<Arc<Connection>> {
        self.connections
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::ConnectionNotFound(id.to_string()))
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Snapshot of every connection.
    pub fn list(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Snapshot of the connections subscribed to `topic`.
    pub fn list_by_topic(&self, topic: Topic) -> Vec<Arc<Connection>> {
        self.filtered(|c| c.topic == topic)
    }

    /// Snapshot of the connections following `correlation_id`.
    pub fn list_by_correlation(&self, correlation_id: &str) -> Vec<Arc<Connection>> {
        self.filtered(|c| c.correlation_id.as_deref() == Some(correlation_id))
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Connection counts.
    pub fn stats(&self) -> RegistryStats {
        let conns = self.connections.read();
        let mut stats = RegistryStats {
            total: conns.len(),
            ..RegistryStats::default()
        };
        for conn in conns.values() {
            *stats.by_topic.entry(conn.topic).or_insert(0) += 1;
            if let Some(cid) = &conn.correlation_id {
                *stats.by_correlation.entry(cid.clone()).or_insert(0) += 1;
            }
        }
        stats
    }

    fn filtered(&self, pred: impl Fn(&Connection) -> bool) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .values()
            .filter(|c| pred(c))
            .cloned()
            .collect()
    }
}
