//! In-process harness for handler tests: an in-memory store, a dispatcher,
//! and connections whose outboxes the test reads directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use duo_db::Database;
use duo_types::events::ServerEvent;

use crate::registry::ConnectionId;
use crate::state::{GatewayConfig, GatewayState};
use crate::store::RetryPolicy;

pub struct Client {
    pub id: ConnectionId,
    pub rx: mpsc::Receiver<ServerEvent>,
}

impl Client {
    /// Everything queued for this connection so far.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = vec![];
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

pub struct Harness {
    pub state: Arc<GatewayState>,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let config = GatewayConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
            ..GatewayConfig::default()
        };
        Self {
            state: GatewayState::new(db, config),
        }
    }

    pub fn user(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.db.create_user(id, username, &capitalize(username)).unwrap();
        id
    }

    /// Make every later write to the users table fail, as a broken disk would.
    pub fn refuse_presence_writes(&self) {
        self.state
            .db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER refuse_presence BEFORE UPDATE ON users
                     BEGIN SELECT RAISE(ABORT, 'presence writes refused'); END;",
                )?;
                Ok(())
            })
            .unwrap();
    }

    pub async fn connect(&self) -> Client {
        let (id, rx) = self.state.dispatcher.register_connection().await;
        Client { id, rx }
    }

    /// Connect and authenticate, then discard the events that produced.
    pub async fn login(&self, user_id: Uuid, username: &str) -> Client {
        let mut client = self.connect().await;
        crate::presence::authenticate(&self.state, client.id, user_id, username.to_string())
            .await
            .unwrap();
        client.drain();
        client
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
