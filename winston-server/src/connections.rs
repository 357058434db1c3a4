//! Connection tracking for the WWS listener.
//!
//! Maintains a thread-safe registry of active client connections and the
//! number of commands each has been served, for `STATUS` and
//! [`WinstonServer::connections`](crate::WinstonServer::connections).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Snapshot of one active connection.
#[derive(Clone, Debug)]
pub struct ConnectionStats {
    pub id: u64,
    pub addr: SocketAddr,
    pub connected_at: SystemTime,
    pub commands_served: u64,
    pub last_command: Option<String>,
}

struct RegistryInner {
    next_id: AtomicU64,
    total_commands: AtomicU64,
    connections: Mutex<HashMap<u64, ConnectionStats>>,
}

/// Thread-safe connection registry. Clone is cheap (Arc).
#[derive(Clone)]
pub struct ConnectionRegistry(Arc<RegistryInner>);

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self(Arc::new(RegistryInner {
            next_id: AtomicU64::new(1),
            total_commands: AtomicU64::new(0),
            connections: Mutex::new(HashMap::new()),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, ConnectionStats>> {
        self.0
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection. Returns a unique connection ID.
    pub fn register(&self, addr: SocketAddr) -> u64 {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let stats = ConnectionStats {
            id,
            addr,
            connected_at: SystemTime::now(),
            commands_served: 0,
            last_command: None,
        };
        self.lock().insert(id, stats);
        id
    }

    pub fn unregister(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Count one served command against connection `id`.
    pub fn record_command(&self, id: u64, name: &str) {
        self.0.total_commands.fetch_add(1, Ordering::Relaxed);
        if let Some(stats) = self.lock().get_mut(&id) {
            stats.commands_served += 1;
            stats.last_command = Some(name.to_owned());
        }
    }

    pub fn snapshot(&self) -> Vec<ConnectionStats> {
        let mut all: Vec<_> = self.lock().values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Commands served since startup, across all connections.
    pub fn total_commands(&self) -> u64 {
        self.0.total_commands.load(Ordering::Relaxed)
    }
}
