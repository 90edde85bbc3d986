use crate::types::ServerMessage;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Tracks connected WebSocket sessions and their outbound channels.
pub struct SessionRegistry {
    /// Outbound channels keyed by session ID.
    clients: DashMap<Uuid, mpsc::UnboundedSender<String>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: DashMap::new(),
        })
    }

    /// Register a new session.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let session = Uuid::new_v4();
        self.clients.insert(session, tx);
        session
    }

    /// Unregister a session. Messages addressed to it afterwards are dropped.
    pub fn unregister(&self, session: Uuid) {
        self.clients.remove(&session);
    }

    /// Send a message to one session.
    pub fn send_to(&self, session: Uuid, msg: &ServerMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            if let Some(client) = self.clients.get(&session) {
                let _ = client.send(json);
            }
        }
    }

    /// Send a message to every connected session.
    pub fn broadcast_all(&self, msg: &ServerMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            for client in self.clients.iter() {
                let _ = client.send(json.clone());
            }
        }
    }

    /// Number of connected sessions.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }
}
