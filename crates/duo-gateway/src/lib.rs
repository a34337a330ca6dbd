pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod handler;
pub mod messages;
pub mod presence;
pub mod reactions;
pub mod receipts;
pub mod registry;
pub mod state;
pub mod store;
pub mod typing;

#[cfg(test)]
mod testing;

pub use connection::handle_connection;
pub use dispatcher::Dispatcher;
pub use error::GatewayError;
pub use state::{GatewayConfig, GatewayState};
