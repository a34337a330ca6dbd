use duo_types::events::ServerEvent;

use crate::error::GatewayError;
use crate::registry::ConnectionId;
use crate::state::GatewayState;

/// Relay a typing indicator to everyone but the sender. Nothing is stored;
/// clients clear their own indicator.
pub async fn typing(
    state: &GatewayState,
    conn: ConnectionId,
    is_typing: bool,
    display_name: String,
) -> Result<(), GatewayError> {
    state.dispatcher.require_identity(conn).await?;
    state
        .dispatcher
        .broadcast_except(
            conn,
            ServerEvent::UserTyping {
                username: display_name,
                is_typing,
            },
        )
        .await;
    Ok(())
}
