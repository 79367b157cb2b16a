//! Fan-out of events to every live connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::connection::{Connection, SessionId};

/// Tracks live connections so events can be sent to all of them.
///
/// Cheap to clone; clones share the same connection table.
#[derive(Clone, Default)]
pub struct Broadcaster {
    connections: Arc<Mutex<HashMap<SessionId, Connection>>>,
}

impl Broadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: Connection) {
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        connections.insert(connection.session_id().clone(), connection);
    }

    pub fn unregister(&self, session_id: &SessionId) {
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if connections.remove(session_id).is_some() {
            debug!("connection unregistered: {}", session_id);
        }
    }

    /// Send an event to every registered connection. Each connection stamps
    /// its own event id, so the same event may carry different ids on
    /// different connections.
    pub fn broadcast(&self, domain: &str, event: &str, parameters: Option<Vec<Value>>) {
        let connections: Vec<Connection> = {
            let guard = self
                .connections
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.values().cloned().collect()
        };
        for connection in connections {
            connection.send_event(domain, event, parameters.clone());
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
