// Datalith - backend and upload-queue controller for an AI-powered data insight platform

pub mod config;
pub mod db;
pub mod models;
pub mod types;
pub mod llm;
pub mod processing;
pub mod analysis;
pub mod storage;
pub mod uploader;  // Client-side upload queue controller
pub mod routes;
pub mod middleware;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
// Note: Import specific items from types module instead of glob to avoid name conflicts
// e.g., use datalith::types::{AppError, AppResult};

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
