use log::*;
use service::AppState;
use std::error::Error;
use tokio::net::TcpListener;

mod controller;
pub mod router;
mod ws;

/// Binds the configured interface and port and serves the HTTP and WebSocket
/// routes until the process is stopped.
pub async fn init_server(app_state: AppState) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listen_address = app_state.config.listen_address();
    let router = router::define_routes(app_state);

    let listener = TcpListener::bind(&listen_address).await?;
    info!("Server starting... listening for connections on http://{listen_address}");

    axum::serve(listener, router).await?;

    Ok(())
}
