use tracing::trace;

use duo_types::events::ClientEvent;

use crate::error::GatewayError;
use crate::messages::{self, Draft};
use crate::registry::ConnectionId;
use crate::state::GatewayState;
use crate::{presence, reactions, receipts, typing};

/// Handle one inbound event. Failures are logged and reported to the
/// originating connection only; they never escape this function.
pub async fn handle_event(state: &GatewayState, conn: ConnectionId, event: ClientEvent) {
    let name = event.name();
    trace!("{} -> {}", conn, name);

    if let Err(err) = dispatch(state, conn, event).await {
        err.log(name, conn);
        state.dispatcher.send_to_connection(conn, err.to_event()).await;
    }
}

/// Route an event to the component that owns it.
pub async fn dispatch(state: &GatewayState, conn: ConnectionId, event: ClientEvent) -> Result<(), GatewayError> {
    match event {
        ClientEvent::Authenticate { user_id, username } => {
            presence::authenticate(state, conn, user_id, username).await
        }

        ClientEvent::SendMessage {
            content,
            kind,
            file_url,
            file_name,
            file_size,
        } => {
            let draft = Draft::new(content, kind, file_url, file_name, file_size);
            messages::send(state, conn, draft).await.map(drop)
        }

        ClientEvent::Typing {
            is_typing,
            username,
        } => typing::typing(state, conn, is_typing, username).await,

        ClientEvent::AddReaction { message_id, emoji } => {
            reactions::react(state, conn, message_id, emoji).await.map(drop)
        }

        ClientEvent::EditMessage {
            message_id,
            content,
        } => messages::edit(state, conn, message_id, content).await.map(drop),

        ClientEvent::DeleteMessage { message_id } => messages::delete(state, conn, message_id).await,

        ClientEvent::MarkRead { message_id } => {
            receipts::mark_read(state, conn, message_id).await.map(drop)
        }
    }
}
