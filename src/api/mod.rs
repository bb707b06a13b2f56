//! API module
//!
//! HTTP surface over [`LedgerService`](crate::handlers::LedgerService).

pub mod extract;
pub mod routes;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::LedgerService;

pub use routes::create_router;

/// Build the application router
pub fn build_router(service: LedgerService) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/metrics", get(routes::metrics))
        .nest("/api/v1", create_router())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
