use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use duo_api::{AppStateInner, messages, users};
use duo_gateway::{GatewayState, connection};

/// Every route the server exposes, wired to one shared store.
pub fn build_router(gateway: Arc<GatewayState>) -> Router {
    let app_state = Arc::new(AppStateInner {
        db: gateway.db.clone(),
    });

    let api_routes = Router::new()
        .route("/api/messages", get(messages::list_messages))
        .route("/api/users/{user_id}/peer", get(users::get_peer))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(gateway);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(api_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<Arc<GatewayState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state))
}
