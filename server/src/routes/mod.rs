//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the HTTP API and the websocket endpoint under a single Axum router.
//! Board state changes flow over `/api/ws`; the REST routes cover listing,
//! creation, and read-only snapshots.

pub mod boards;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/board", get(boards::list_boards_rest).post(boards::create_board_rest))
        .route("/api/board/{id}/objects", get(boards::list_objects))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
