pub mod control_routes;

use axum::{response::Json, routing::get, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::middleware::cors::cors_middleware_with_origins;
use crate::state::AppState;

/// Router completo de la API
pub fn build_router(state: AppState) -> Router {
    let cors = cors_middleware_with_origins(&state.config);

    Router::new()
        .route("/health", get(health))
        .nest("/api/control", control_routes::create_control_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "drone_dispatch",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
