use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use duo_types::events::{ClientEvent, ServerEvent};

use crate::error::GatewayError;
use crate::handler::handle_event;
use crate::presence;
use crate::registry::ConnectionId;
use crate::state::GatewayState;

/// Missed pongs in a row before the connection is dropped.
const MAX_MISSED_PONGS: u8 = 2;

/// Drive one WebSocket from upgrade to close. The connection starts
/// unauthenticated; clients bind it with an `authenticate` event.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut sender, receiver) = socket.split();

    // Register before greeting so nothing broadcast in between is lost;
    // it waits in the outbox.
    let (conn_id, mut outbox) = state.dispatcher.register_connection().await;
    info!("{} opened", conn_id);

    let greeting = ServerEvent::Connected {
        message: state.config.welcome_message.clone(),
        timestamp: Utc::now(),
    };
    if !send_event(&mut sender, conn_id, &greeting).await {
        presence::disconnect(&state, conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;
    let heartbeat_interval = state.config.heartbeat_interval;

    // Outbox -> socket, plus heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_pongs: u8 = 0;

        loop {
            tokio::select! {
                event = outbox.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, conn_id, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_pongs = 0;
                    } else {
                        missed_pongs += 1;
                        if missed_pongs >= MAX_MISSED_PONGS {
                            warn!("{} missed {} pongs, dropping connection", conn_id, missed_pongs);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Socket -> handlers. Never aborted: an event that has started runs to
    // completion, the reader only stops between events.
    let stop = Arc::new(Notify::new());
    let mut recv_task = tokio::spawn(read_inbound(
        receiver,
        state.clone(),
        conn_id,
        pong_flag_recv,
        stop.clone(),
    ));

    let writer_done = tokio::select! {
        _ = &mut send_task => true,
        _ = &mut recv_task => false,
    };
    if writer_done {
        stop.notify_one();
        if let Err(e) = recv_task.await {
            error!("Reader of {} failed: {}", conn_id, e);
        }
    } else {
        send_task.abort();
    }

    presence::disconnect(&state, conn_id).await;
    info!("{} closed", conn_id);
}

/// Feed inbound frames to the handlers until the socket ends or `stop` fires.
async fn read_inbound<S>(
    mut receiver: S,
    state: Arc<GatewayState>,
    conn_id: ConnectionId,
    pong_received: Arc<AtomicBool>,
    stop: Arc<Notify>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            _ = stop.notified() => break,
            msg = receiver.next() => msg,
        };
        let Some(Ok(msg)) = msg else { break };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_event(&state, conn_id, event).await,
                Err(e) => {
                    warn!(
                        "{} sent a bad frame: {} -- raw: {}",
                        conn_id,
                        e,
                        truncate(&text, 200)
                    );
                    let err = GatewayError::InvalidPayload(e.to_string());
                    state
                        .dispatcher
                        .send_to_connection(conn_id, err.to_event())
                        .await;
                }
            },
            Message::Binary(_) => {
                debug!("{} sent a binary frame, ignoring", conn_id);
            }
            Message::Pong(_) => {
                pong_received.store(true, Ordering::Release);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Serialize and write one event. False once the socket is unusable.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    conn_id: ConnectionId,
    event: &ServerEvent,
) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            // Skip the event, keep the connection
            error!("Failed to serialize {} for {}: {}", event.name(), conn_id, e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::stream;
    use uuid::Uuid;

    use super::*;
    use crate::testing::Harness;

    fn authenticate_frame(user_id: Uuid) -> Result<Message, axum::Error> {
        let frame = serde_json::json!({
            "event": "authenticate",
            "data": { "userId": user_id, "username": "alice" },
        });
        Ok(Message::Text(frame.to_string().into()))
    }

    #[tokio::test]
    async fn stopping_the_reader_lets_the_current_event_finish() {
        let h = Harness::new();
        let alice = h.user("alice");
        let client = h.connect().await;
        let frames = stream::iter(vec![authenticate_frame(alice)]).chain(stream::pending());
        let stop = Arc::new(Notify::new());

        // Park the authenticate mid-flight, then ask the reader to stop
        let gate = h.state.presence_gate.lock().await;
        let reader = tokio::spawn(read_inbound(
            frames,
            h.state.clone(),
            client.id,
            Arc::new(AtomicBool::new(true)),
            stop.clone(),
        ));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        stop.notify_one();
        drop(gate);
        tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.state.dispatcher.lookup(client.id).await.unwrap().user_id, alice);
        assert!(h.state.db.get_user(alice).unwrap().unwrap().is_online);

        presence::disconnect(&h.state, client.id).await;
        assert!(!h.state.db.get_user(alice).unwrap().unwrap().is_online);
    }

    #[tokio::test]
    async fn bad_frames_get_an_error_and_the_reader_keeps_going() {
        let h = Harness::new();
        let alice = h.user("alice");
        let mut client = h.connect().await;
        let frames = stream::iter(vec![
            Ok(Message::Text("not json".into())),
            authenticate_frame(alice),
        ]);

        read_inbound(
            frames,
            h.state.clone(),
            client.id,
            Arc::new(AtomicBool::new(true)),
            Arc::new(Notify::new()),
        )
        .await;

        match client.drain().as_slice() {
            [ServerEvent::Error { kind, .. }] => {
                assert_eq!(*kind, duo_types::events::ErrorKind::InvalidPayload)
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(h.state.dispatcher.lookup(client.id).await.is_some());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hola", 200), "hola");
        assert_eq!(truncate("abcdef", 3), "abc");
        // 'é' is two bytes; cutting inside it backs off
        assert_eq!(truncate("aé", 2), "a");
    }
}
