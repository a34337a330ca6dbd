pub mod messages;
pub mod users;

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::error;

use duo_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
}

/// Run a blocking store call off the async runtime. Any failure is a 500.
pub(crate) async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || op(db.as_ref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Store error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
    })
}
