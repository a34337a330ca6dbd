use thiserror::Error;
use tracing::{error, warn};

use duo_types::events::{ErrorKind, ServerEvent};

use crate::registry::ConnectionId;

/// Failure of a single inbound event. Always reported back to the
/// originating connection and never to anyone else.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Not authenticated")]
    AuthenticationRequired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Store failure: {0:#}")]
    Store(anyhow::Error),

    #[error("Store unavailable after {attempts} attempts: {last_error:#}")]
    StoreUnavailable {
        attempts: u32,
        last_error: anyhow::Error,
    },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationRequired => ErrorKind::AuthenticationRequired,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::Store(_) => ErrorKind::StoreFailure,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
        }
    }

    /// What the client sees. Store internals stay in the server log.
    pub fn client_message(&self) -> String {
        match self {
            Self::Store(_) => "Internal storage error".to_string(),
            Self::StoreUnavailable { .. } => "Storage temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::error(self.kind(), self.client_message())
    }

    pub(crate) fn log(&self, event: &str, conn: ConnectionId) {
        match self {
            Self::Store(_) | Self::StoreUnavailable { .. } => {
                error!("{} on {} failed: {}", event, conn, self)
            }
            _ => warn!("{} on {} rejected: {}", event, conn, self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_hide_details_from_clients() {
        let err = GatewayError::Store(anyhow::anyhow!("disk I/O error at /var/lib/duo.db"));
        match err.to_event() {
            ServerEvent::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::StoreFailure);
                assert!(!message.contains("/var/lib"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn retries_exhausted_is_its_own_kind() {
        let err = GatewayError::StoreUnavailable {
            attempts: 3,
            last_error: anyhow::anyhow!("database is locked"),
        };
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(GatewayError::NotFound("message").client_message(), "message not found");
    }
}
