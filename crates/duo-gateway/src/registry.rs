use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use duo_types::events::ServerEvent;

/// Server-assigned id of one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// The user a connection has authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
}

pub(crate) struct Entry {
    pub outbox: mpsc::Sender<ServerEvent>,
    pub identity: Option<Identity>,
}

/// A binding that was just removed from a connection.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Unbound {
    pub identity: Option<Identity>,
    /// True when the removed binding was the user's last bound connection.
    pub last_connection: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BindOutcome {
    /// `replaced` describes a binding to a different user that this one displaced.
    Bound { replaced: Unbound },
    /// The connection closed before the bind landed.
    Gone,
}

/// Live connections and who they are bound to.
///
/// Keeps a reverse index from user to bound connections so that presence can
/// tell a user's last disconnect apart from one device of several going away.
/// Not synchronized; the dispatcher owns it behind a lock.
#[derive(Default)]
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, Entry>,
    by_user: HashMap<Uuid, HashSet<ConnectionId>>,
}

impl ConnectionTable {
    pub fn insert(&mut self, id: ConnectionId, outbox: mpsc::Sender<ServerEvent>) {
        self.connections.insert(
            id,
            Entry {
                outbox,
                identity: None,
            },
        );
    }

    /// Bind `identity` to the connection, replacing whatever was bound before.
    pub fn bind(&mut self, id: ConnectionId, identity: Identity) -> BindOutcome {
        let Some(entry) = self.connections.get_mut(&id) else {
            return BindOutcome::Gone;
        };

        let user_id = identity.user_id;
        let previous = entry.identity.replace(identity);
        if let Some(prev) = &previous {
            self.detach(prev.user_id, id);
        }
        self.by_user.entry(user_id).or_default().insert(id);

        let replaced = match previous {
            Some(prev) if prev.user_id != user_id => Unbound {
                last_connection: !self.by_user.contains_key(&prev.user_id),
                identity: Some(prev),
            },
            _ => Unbound::default(),
        };
        BindOutcome::Bound { replaced }
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<&Identity> {
        self.connections.get(&id)?.identity.as_ref()
    }

    /// Forget the connection entirely (transport closed).
    pub fn remove(&mut self, id: ConnectionId) -> Unbound {
        let identity = self.connections.remove(&id).and_then(|entry| entry.identity);
        self.release(id, identity)
    }

    pub fn connections_for_user(&self, user_id: Uuid) -> impl Iterator<Item = ConnectionId> + '_ {
        self.by_user.get(&user_id).into_iter().flatten().copied()
    }

    pub fn is_user_bound(&self, user_id: Uuid) -> bool {
        self.by_user.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub(crate) fn get(&self, id: ConnectionId) -> Option<&Entry> {
        self.connections.get(&id)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (ConnectionId, &Entry)> + '_ {
        self.connections.iter().map(|(id, entry)| (*id, entry))
    }

    fn release(&mut self, id: ConnectionId, identity: Option<Identity>) -> Unbound {
        match identity {
            Some(identity) => {
                self.detach(identity.user_id, id);
                Unbound {
                    last_connection: !self.by_user.contains_key(&identity.user_id),
                    identity: Some(identity),
                }
            }
            None => Unbound::default(),
        }
    }

    fn detach(&mut self, user_id: Uuid, id: ConnectionId) {
        if let Some(set) = self.by_user.get_mut(&user_id) {
            set.remove(&id);
            if set.is_empty() {
                self.by_user.remove(&user_id);
            }
        }
    }
}
