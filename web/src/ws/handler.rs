use crate::ws::connection::{WebSocketSink, WebSocketStream};
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::StreamExt;
use log::*;
use service::AppState;

/// Upgrades `GET /ws` to a WebSocket and hands the connection to a session.
///
/// Upgrade is unconditional. Admission control happens once the session tries
/// to register, so a connection over the ceiling is accepted and then closed.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> Response {
    let session = app_state.session_handler();

    ws.on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {e}"))
        .on_upgrade(move |socket: WebSocket| async move {
            let (sink, stream) = socket.split();
            session
                .run(
                    Box::new(WebSocketSink::new(sink)),
                    WebSocketStream::new(stream),
                )
                .await;
        })
}
