//! Courier API — HTTP surface over command dispatch and the accounts read
//! side.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use state::AppState;

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    // TODO: restrict CORS origins once deployment hosts are configurable.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/commands", routes::commands::router())
        .nest("/api/v1/accounts", routes::accounts::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
