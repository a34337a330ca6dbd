use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use duo_db::models::NewMessage;
use duo_types::events::ServerEvent;
use duo_types::models::{Attachment, Message, MessageKind};

use crate::error::GatewayError;
use crate::guard;
use crate::registry::ConnectionId;
use crate::state::GatewayState;
use crate::store::with_store;

/// A message as submitted by a client, before the server stamps it.
#[derive(Debug, Clone)]
pub struct Draft {
    pub content: String,
    pub kind: MessageKind,
    pub attachment: Option<Attachment>,
}

impl Draft {
    /// An attachment exists iff a file URL was supplied.
    pub fn new(
        content: String,
        kind: MessageKind,
        file_url: Option<String>,
        file_name: Option<String>,
        file_size: Option<i64>,
    ) -> Self {
        Self {
            content,
            kind,
            attachment: file_url.map(|url| Attachment {
                url,
                name: file_name,
                size: file_size,
            }),
        }
    }
}

/// Persist a new message from the bound user and broadcast it to every
/// connection, the sender included.
pub async fn send(state: &GatewayState, conn: ConnectionId, draft: Draft) -> Result<Message, GatewayError> {
    let author = state.dispatcher.require_identity(conn).await?;

    if draft.content.trim().is_empty() && draft.attachment.is_none() {
        return Err(GatewayError::InvalidPayload(
            "message needs content or an attachment".into(),
        ));
    }

    let new = NewMessage {
        id: Uuid::new_v4(),
        user_id: author.user_id,
        content: draft.content,
        kind: draft.kind,
        attachment: draft.attachment,
    };
    let message_id = new.id;
    with_store(state, move |db| db.insert_message(&new)).await?;

    let message = load_message(state, message_id).await?;
    info!(
        "{} ({}) sent {} message {}",
        author.display_name,
        author.user_id,
        message.kind.as_str(),
        message_id
    );
    state
        .dispatcher
        .broadcast(ServerEvent::NewMessage(message.clone()))
        .await;
    Ok(message)
}

/// Replace the content of one of the bound user's own messages.
pub async fn edit(
    state: &GatewayState,
    conn: ConnectionId,
    message_id: Uuid,
    content: String,
) -> Result<Message, GatewayError> {
    let actor = state.dispatcher.require_identity(conn).await?;

    if content.trim().is_empty() {
        return Err(GatewayError::InvalidPayload("edited content is empty".into()));
    }

    let existing = load_message(state, message_id).await?;
    guard::ensure_author(actor.user_id, existing.user_id)?;

    let actor_id = actor.user_id;
    let edited_at = Utc::now();
    let updated = with_store(state, move |db| {
        db.update_message_content(message_id, actor_id, &content, edited_at)
    })
    .await?;
    // The UPDATE is author-scoped too, so nothing changed if this fails
    if !updated {
        return Err(GatewayError::Unauthorized);
    }

    let message = load_message(state, message_id).await?;
    debug!("{} edited message {}", actor.display_name, message_id);
    state
        .dispatcher
        .broadcast(ServerEvent::MessageUpdated(message.clone()))
        .await;
    Ok(message)
}

/// Soft-delete one of the bound user's own messages. Content stays in the
/// store; the broadcast carries only the id.
pub async fn delete(state: &GatewayState, conn: ConnectionId, message_id: Uuid) -> Result<(), GatewayError> {
    let actor = state.dispatcher.require_identity(conn).await?;

    let existing = load_message(state, message_id).await?;
    guard::ensure_author(actor.user_id, existing.user_id)?;

    let actor_id = actor.user_id;
    let deleted = with_store(state, move |db| db.soft_delete_message(message_id, actor_id)).await?;
    if !deleted {
        return Err(GatewayError::Unauthorized);
    }

    info!("{} deleted message {}", actor.display_name, message_id);
    state
        .dispatcher
        .broadcast(ServerEvent::MessageDeleted { message_id })
        .await;
    Ok(())
}

/// Hydrated message or `NotFound`.
pub(crate) async fn load_message(state: &GatewayState, message_id: Uuid) -> Result<Message, GatewayError> {
    with_store(state, move |db| db.get_message(message_id))
        .await?
        .ok_or(GatewayError::NotFound("message"))
}
