use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use duo_types::events::ServerEvent;

use crate::error::GatewayError;
use crate::messages::load_message;
use crate::registry::ConnectionId;
use crate::state::GatewayState;
use crate::store::with_store;

/// Record that the bound user has read a message and tell the author.
///
/// Returns true when this call created the receipt. Repeat calls are silent
/// no-ops. Authors reading their own messages get a receipt but no notice.
pub async fn mark_read(state: &GatewayState, conn: ConnectionId, message_id: Uuid) -> Result<bool, GatewayError> {
    let reader = state.dispatcher.require_identity(conn).await?;
    let message = load_message(state, message_id).await?;

    let reader_id = reader.user_id;
    let read_at = Utc::now();
    let created = with_store(state, move |db| db.insert_read_receipt(message_id, reader_id, read_at)).await?;
    if !created {
        debug!("{} already read {}", reader.display_name, message_id);
        return Ok(false);
    }

    if message.user_id != reader_id {
        let delivered = state
            .dispatcher
            .send_to_user(
                message.user_id,
                ServerEvent::MessageRead {
                    message_id,
                    read_by: reader_id,
                },
            )
            .await;
        debug!(
            "{} read {}, notified {} author connection(s)",
            reader.display_name, message_id, delivered
        );
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Draft, send};
    use crate::testing::Harness;
    use duo_types::models::MessageKind;

    #[tokio::test]
    async fn first_read_notifies_only_the_author() {
        let h = Harness::new();
        let alice = h.user("alice");
        let bob = h.user("bob");
        let carol = h.user("carol");
        let mut phone = h.login(alice, "alice").await;
        let mut laptop = h.login(alice, "alice").await;
        let mut reader = h.login(bob, "bob").await;
        let mut bystander = h.login(carol, "carol").await;
        let draft = Draft::new("hola".into(), MessageKind::Text, None, None, None);
        let msg = send(&h.state, phone.id, draft).await.unwrap();
        for c in [&mut phone, &mut laptop, &mut reader, &mut bystander] {
            c.drain();
        }

        assert!(mark_read(&h.state, reader.id, msg.id).await.unwrap());

        let expected = vec![ServerEvent::MessageRead {
            message_id: msg.id,
            read_by: bob,
        }];
        assert_eq!(phone.drain(), expected);
        assert_eq!(laptop.drain(), expected);
        assert!(reader.drain().is_empty());
        assert!(bystander.drain().is_empty());
    }

    #[tokio::test]
    async fn repeated_reads_create_one_receipt_and_one_notice() {
        let h = Harness::new();
        let alice = h.user("alice");
        let bob = h.user("bob");
        let mut author = h.login(alice, "alice").await;
        let reader = h.login(bob, "bob").await;
        let draft = Draft::new("hola".into(), MessageKind::Text, None, None, None);
        let msg = send(&h.state, author.id, draft).await.unwrap();
        author.drain();

        assert!(mark_read(&h.state, reader.id, msg.id).await.unwrap());
        assert!(!mark_read(&h.state, reader.id, msg.id).await.unwrap());

        assert_eq!(author.drain().len(), 1);
        assert_eq!(h.state.db.get_read_receipts(msg.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reading_your_own_message_sends_nothing() {
        let h = Harness::new();
        let alice = h.user("alice");
        let mut author = h.login(alice, "alice").await;
        let draft = Draft::new("note to self".into(), MessageKind::Text, None, None, None);
        let msg = send(&h.state, author.id, draft).await.unwrap();
        author.drain();

        assert!(mark_read(&h.state, author.id, msg.id).await.unwrap());
        assert!(author.drain().is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_mark_read_writes_nothing() {
        let h = Harness::new();
        let alice = h.user("alice");
        let author = h.login(alice, "alice").await;
        let draft = Draft::new("hola".into(), MessageKind::Text, None, None, None);
        let msg = send(&h.state, author.id, draft).await.unwrap();
        let stranger = h.connect().await;

        let err = mark_read(&h.state, stranger.id, msg.id).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationRequired));
        assert!(h.state.db.get_read_receipts(msg.id).unwrap().is_empty());
    }
}
