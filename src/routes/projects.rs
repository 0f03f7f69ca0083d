use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::db::operations::DatabaseOperations;
use crate::models::{AppState, CreateProjectRequest, ProjectRecord};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/projects", get(list_projects).post(create_project))
        .with_state(state)
}

async fn list_projects(State(state): State<AppState>) -> AppResult<Json<Vec<ProjectRecord>>> {
    let records = DatabaseOperations::list_projects(&state.pool).await?;
    Ok(Json(records))
}

async fn create_project(
    State(state): State<AppState>,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<ProjectRecord>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest(
            "Project name is required".to_string(),
        ));
    }

    let record =
        DatabaseOperations::create_project(&state.pool, name, payload.description.as_deref())
            .await?;

    Ok((StatusCode::CREATED, Json(record)))
}
