use tracing::debug;
use uuid::Uuid;

use duo_types::events::ServerEvent;
use duo_types::models::Message;

use crate::error::GatewayError;
use crate::messages::load_message;
use crate::registry::ConnectionId;
use crate::state::GatewayState;
use crate::store::with_store;

const MAX_EMOJI_LEN: usize = 64;

/// Set the bound user's reaction on a message. A user holds at most one
/// reaction per message; reacting again swaps the emoji.
pub async fn react(
    state: &GatewayState,
    conn: ConnectionId,
    message_id: Uuid,
    emoji: String,
) -> Result<Message, GatewayError> {
    let actor = state.dispatcher.require_identity(conn).await?;

    let emoji = emoji.trim().to_string();
    if emoji.is_empty() || emoji.len() > MAX_EMOJI_LEN {
        return Err(GatewayError::InvalidPayload("emoji must be 1-64 bytes".into()));
    }

    // Surfaces NotFound instead of a foreign-key failure
    load_message(state, message_id).await?;

    let user_id = actor.user_id;
    with_store(state, move |db| {
        db.upsert_reaction(Uuid::new_v4(), message_id, user_id, &emoji)
    })
    .await?;

    let message = load_message(state, message_id).await?;
    debug!(
        "{} reacted to {} ({} reactions now)",
        actor.display_name,
        message_id,
        message.reactions.len()
    );
    state
        .dispatcher
        .broadcast(ServerEvent::MessageUpdated(message.clone()))
        .await;
    Ok(message)
}
