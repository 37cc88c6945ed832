use crate::controller::{connected_users_controller, health_check_controller};
use crate::ws::handler::ws_handler;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use log::*;
use service::AppState;
use tower_http::cors::CorsLayer;

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config.allowed_origins);

    Router::new()
        .merge(health_routes())
        .merge(ws_routes(app_state.clone()))
        .merge(connected_users_routes(app_state))
        .layer(cors)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                warn!("CORS: ignoring invalid origin in config: {origin}");
                None
            })
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_credentials(true)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn ws_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}

fn connected_users_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws/users", get(connected_users_controller::index))
        .with_state(app_state)
}
