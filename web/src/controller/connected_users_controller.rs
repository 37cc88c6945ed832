use crate::controller::ApiResponse;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde::Serialize;
use service::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct ConnectedUsers {
    users: Vec<String>,
    online_users: Vec<String>,
    connection_count: usize,
    max_connections: usize,
}

/// GET the distinct authenticated users currently connected to the hub, the
/// users the presence store reports as online, the live connection count and
/// the configured ceiling.
pub async fn index(State(app_state): State<AppState>) -> impl IntoResponse {
    let hub = &app_state.hub;

    // Presence lives in an external store; the hub's own view is still useful
    // when that store is unavailable.
    let online_users = app_state
        .presence_store
        .online_users()
        .await
        .unwrap_or_else(|e| {
            warn!("Failed to read online users from presence store: {e}");
            Vec::new()
        });

    let connected = ConnectedUsers {
        users: hub.list_connected_users().await,
        online_users,
        connection_count: hub.connection_count().await,
        max_connections: hub.max_connections(),
    };

    debug!(
        "Connected users: {} user(s) across {} connection(s)",
        connected.users.len(),
        connected.connection_count
    );

    Json(ApiResponse::new(StatusCode::OK.into(), connected))
}
