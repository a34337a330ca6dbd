use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use duo_db::Database;

use crate::dispatcher::Dispatcher;
use crate::store::RetryPolicy;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub outbox_capacity: usize,
    /// Ping interval; two missed pongs drop the connection
    pub heartbeat_interval: Duration,
    pub retry: RetryPolicy,
    /// Text of the `connected` greeting
    pub welcome_message: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            heartbeat_interval: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            welcome_message: "Connected to Duo chat server".to_string(),
        }
    }
}

/// Everything an event handler needs: the store, the live connections, and
/// the knobs.
pub struct GatewayState {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub config: GatewayConfig,
    /// Held across each registry change and the presence write that goes
    /// with it, so the stored online flag always matches the registry.
    pub(crate) presence_gate: Mutex<()>,
}

impl GatewayState {
    pub fn new(db: Arc<Database>, config: GatewayConfig) -> Arc<Self> {
        Arc::new(Self {
            db,
            dispatcher: Dispatcher::new(config.outbox_capacity),
            config,
            presence_gate: Mutex::new(()),
        })
    }
}
