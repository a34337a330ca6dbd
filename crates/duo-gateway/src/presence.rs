//! Online/offline state derived from connection lifecycle.
//!
//! A user is online while at least one connection is bound to them. Every
//! successful authenticate announces the user as online to everyone else;
//! only the disconnect of their last bound connection announces them offline.
//!
//! Both transitions run under `GatewayState::presence_gate`: the registry
//! change and the store write land together or not at all relative to any
//! other transition.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use duo_types::events::ServerEvent;

use crate::error::GatewayError;
use crate::registry::{BindOutcome, ConnectionId, Identity};
use crate::state::GatewayState;
use crate::store::with_store;

/// Bind `conn` to `user_id` and announce the user as online.
///
/// Nothing is bound if the user is unknown or the presence write fails.
pub async fn authenticate(
    state: &GatewayState,
    conn: ConnectionId,
    user_id: Uuid,
    username: String,
) -> Result<(), GatewayError> {
    let _gate = state.presence_gate.lock().await;

    let now = Utc::now();
    let found = with_store(state, move |db| db.set_presence(user_id, true, now)).await?;
    if !found {
        return Err(GatewayError::NotFound("user"));
    }

    let identity = Identity {
        user_id,
        display_name: username,
    };
    let display_name = identity.display_name.clone();

    match state.dispatcher.bind(conn, identity).await {
        BindOutcome::Bound { replaced } => {
            info!("{} ({}) authenticated on {}", display_name, user_id, conn);
            state
                .dispatcher
                .broadcast_except(
                    conn,
                    ServerEvent::UserStatus {
                        user_id,
                        is_online: true,
                        last_seen: now,
                    },
                )
                .await;

            if let Some(previous) = replaced.identity {
                if replaced.last_connection {
                    info!(
                        "{} re-authenticated as a different user, {} ({}) is now offline",
                        conn, previous.display_name, previous.user_id
                    );
                    mark_offline(state, previous.user_id).await?;
                }
            }
            Ok(())
        }
        BindOutcome::Gone => {
            // Closed while the presence write was in flight; undo it unless
            // another connection of the same user is still live.
            debug!("{} closed before {} could be bound", conn, user_id);
            if !state.dispatcher.is_user_bound(user_id).await {
                let seen = Utc::now();
                with_store(state, move |db| db.set_presence(user_id, false, seen)).await?;
            }
            Ok(())
        }
    }
}

/// Transport closed. Registry cleanup always happens first and always
/// completes; the offline write that follows is best-effort.
pub async fn disconnect(state: &GatewayState, conn: ConnectionId) {
    let _gate = state.presence_gate.lock().await;
    let unbound = state.dispatcher.disconnect(conn).await;

    let Some(identity) = unbound.identity else {
        debug!("{} closed without authenticating", conn);
        return;
    };

    if !unbound.last_connection {
        info!(
            "{} ({}) closed {}, other connections still live",
            identity.display_name, identity.user_id, conn
        );
        return;
    }

    if let Err(e) = mark_offline(state, identity.user_id).await {
        error!(
            "Failed to persist offline state for {} ({}): {}",
            identity.display_name, identity.user_id, e
        );
    }
    info!("{} ({}) disconnected", identity.display_name, identity.user_id);
}

/// Persist and announce that `user_id` went offline. The announcement goes
/// out even when the write fails.
async fn mark_offline(state: &GatewayState, user_id: Uuid) -> Result<DateTime<Utc>, GatewayError> {
    let seen = Utc::now();
    let stored = with_store(state, move |db| db.set_presence(user_id, false, seen)).await;

    state
        .dispatcher
        .broadcast(ServerEvent::UserStatus {
            user_id,
            is_online: false,
            last_seen: seen,
        })
        .await;

    stored.map(|_| seen)
}
