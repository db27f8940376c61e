pub mod health;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::context::SharedContext;

/// Create the observability router (`/health`, `/metrics`)
pub fn create_router(ctx: Arc<SharedContext>) -> Router {
    Router::new()
        .merge(health::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
