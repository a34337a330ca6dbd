use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use duo_types::api::PeerResponse;

use crate::{AppState, blocking};

/// The other participant of the conversation, with their presence.
pub async fn get_peer(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PeerResponse>, StatusCode> {
    let peer = blocking(&state, move |db| {
        if db.get_user(user_id)?.is_none() {
            return Ok(None);
        }
        db.find_peer(user_id)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(peer.into()))
}
