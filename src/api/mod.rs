mod error;
mod rest;
mod types;
mod websocket;

pub use error::{ApiError, ApiResult};
pub use rest::RestApi;
pub use types::*;
pub use websocket::{websocket_handler, BroadcastListener, WebSocketState};

use crate::coordinator::TransferCoordinator;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the REST, WebSocket and metrics router
///
/// Registers a [`BroadcastListener`] on the coordinator to feed `/ws`.
pub fn create_api_server(coordinator: TransferCoordinator) -> Router {
    let rest_api = RestApi::new(coordinator.clone());

    let events = BroadcastListener::new();
    coordinator.register_listener(Arc::new(events.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_router = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(WebSocketState {
            coordinator: Arc::new(coordinator),
            events,
        });

    Router::new()
        .merge(rest_api.router())
        .merge(ws_router)
        .route("/metrics", crate::metrics::metrics_route())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
