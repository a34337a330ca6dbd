use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

use duo_types::events::ServerEvent;

use crate::error::GatewayError;
use crate::registry::{BindOutcome, ConnectionId, ConnectionTable, Entry, Identity, Unbound};

/// Manages all connected clients and fans events out to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every live connection, its outbox and its bound identity
    table: RwLock<ConnectionTable>,

    /// Per-connection outbox size. A full outbox drops events for that
    /// connection only; senders are never slowed down.
    outbox_capacity: usize,
}

impl Dispatcher {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                table: RwLock::new(ConnectionTable::default()),
                outbox_capacity: outbox_capacity.max(1),
            }),
        }
    }

    /// Register a freshly opened transport. Returns its id and the receiving
    /// end of its outbox.
    pub async fn register_connection(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.inner.outbox_capacity);
        self.inner.table.write().await.insert(id, tx);
        (id, rx)
    }

    /// Forget a connection. Cleanup is unconditional.
    pub async fn disconnect(&self, id: ConnectionId) -> Unbound {
        self.inner.table.write().await.remove(id)
    }

    pub async fn bind(&self, id: ConnectionId, identity: Identity) -> BindOutcome {
        self.inner.table.write().await.bind(id, identity)
    }

    pub async fn lookup(&self, id: ConnectionId) -> Option<Identity> {
        self.inner.table.read().await.lookup(id).cloned()
    }

    /// The bound identity, or `AuthenticationRequired` for an unbound connection.
    pub async fn require_identity(&self, id: ConnectionId) -> Result<Identity, GatewayError> {
        self.lookup(id).await.ok_or(GatewayError::AuthenticationRequired)
    }

    pub async fn is_user_bound(&self, user_id: Uuid) -> bool {
        self.inner.table.read().await.is_user_bound(user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.table.read().await.len()
    }

    /// Broadcast an event to all connected clients. Returns how many outboxes accepted it.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let table = self.inner.table.read().await;
        table
            .entries()
            .filter(|(id, entry)| deliver(*id, entry, &event))
            .count()
    }

    /// Broadcast to everyone except `origin`.
    pub async fn broadcast_except(&self, origin: ConnectionId, event: ServerEvent) -> usize {
        let table = self.inner.table.read().await;
        table
            .entries()
            .filter(|(id, _)| *id != origin)
            .filter(|(id, entry)| deliver(*id, entry, &event))
            .count()
    }

    /// Send a targeted event to a single connection.
    pub async fn send_to_connection(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let table = self.inner.table.read().await;
        table.get(id).is_some_and(|entry| deliver(id, entry, &event))
    }

    /// Send a targeted event to every connection bound to `user_id`.
    pub async fn send_to_user(&self, user_id: Uuid, event: ServerEvent) -> usize {
        let table = self.inner.table.read().await;
        table
            .connections_for_user(user_id)
            .filter(|id| table.get(*id).is_some_and(|entry| deliver(*id, entry, &event)))
            .count()
    }
}

/// At-most-once delivery into one outbox. Never waits.
fn deliver(id: ConnectionId, entry: &Entry, event: &ServerEvent) -> bool {
    match entry.outbox.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            debug!("Outbox of {} is full, dropping {}", id, dropped.name());
            false
        }
        Err(TrySendError::Closed(_)) => {
            trace!("Outbox of {} already closed", id);
            false
        }
    }
}
