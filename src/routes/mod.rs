//! API Routes
//!
//! HTTP endpoints exposed by the service:
//! - `/api/v1/files` - Upload pipeline and file metadata
//! - `/api/v1/analysis` - AI analysis generation and retrieval
//! - `/api/v1/projects` - Project listing and creation
//! - `/api/health` - Health checks

pub mod analysis;
pub mod files;
pub mod health;
pub mod projects;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = crate::middleware::cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(files::router(state.clone()))
        .merge(analysis::router(state.clone()))
        .merge(projects::router(state.clone()))
        .merge(health::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
