//! Registry of connected peers and their outbound queues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use outpost_protocol::ServerMessage;
use tokio::sync::mpsc;

/// Unique identifier for a connection within one server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Hands out monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned when the registry is at capacity.
#[derive(Debug)]
pub struct ConnectionLimitReached;

/// Outbound text queues keyed by connection. Broadcasts happen from hub
/// listeners, which are synchronous, so this uses a plain mutex.
pub struct ConnectionMap {
    inner: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,
    max_connections: usize,
}

impl ConnectionMap {
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_connections,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::UnboundedSender<String>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(
        &self,
        id: ConnectionId,
        queue: mpsc::UnboundedSender<String>,
    ) -> Result<(), ConnectionLimitReached> {
        let mut map = self.lock();
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }
        map.insert(id, queue);
        Ok(())
    }

    pub fn remove(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Encode once and queue for every connection.
    pub fn broadcast(&self, message: &ServerMessage) {
        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(kind = message.kind(), %err, "failed to encode broadcast");
                return;
            }
        };
        for (id, queue) in self.lock().iter() {
            if queue.send(text.clone()).is_err() {
                tracing::trace!(connection = id.0, "queue closed, broadcast skipped");
            }
        }
    }
}
