// Upload pipeline: validate, store the object, process the bytes, clean
// tabular data, generate an AI summary, persist, and report. The GET
// endpoints double as the status surface the upload queue polls.

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::db::operations::DatabaseOperations;
use crate::models::{AppState, FileListQuery, FileRecord, FileUploadResponse};
use crate::processing::cleaner::DataCleaner;
use crate::processing::{validate_upload, FileProcessor, FileType, MAX_FILE_SIZE};
use crate::types::{AppError, AppResult};

// Authentication is out of scope; every row is attributed to a fixed user
pub const PLACEHOLDER_USER_ID: Uuid = Uuid::nil();

// Multipart framing needs headroom above the file ceiling
const UPLOAD_BODY_LIMIT: usize = (MAX_FILE_SIZE as usize) + 2 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/files/upload",
            post(upload_file).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/v1/files", get(list_files))
        .route("/api/v1/files/{file_id}", get(get_file))
        .with_state(state)
}

async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<FileUploadResponse>)> {
    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut project_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                filename = field.file_name().map(|name| name.to_string());
                let data = field.bytes().await.map_err(|e| {
                    AppError::InvalidRequest(format!("Failed to read upload: {}", e))
                })?;
                bytes = Some(data.to_vec());
            }
            Some("project_id") => {
                let text = field.text().await.map_err(|e| {
                    AppError::InvalidRequest(format!("Failed to read project_id: {}", e))
                })?;
                if !text.trim().is_empty() {
                    project_id = Some(text.trim().parse().map_err(|_| {
                        AppError::InvalidRequest(format!("Invalid project_id: {}", text))
                    })?);
                }
            }
            _ => {}
        }
    }

    let filename =
        filename.ok_or_else(|| AppError::InvalidRequest("No file provided".to_string()))?;
    let bytes = bytes.ok_or_else(|| AppError::InvalidRequest("No file provided".to_string()))?;

    let file_type =
        validate_upload(&filename, bytes.len() as u64).map_err(AppError::InvalidRequest)?;

    info!(
        %filename,
        file_type = file_type.as_str(),
        size = bytes.len(),
        "Processing upload"
    );

    let content_type = mime_guess::from_path(&filename)
        .first_or_octet_stream()
        .to_string();

    let storage_path = state
        .storage
        .upload_file(PLACEHOLDER_USER_ID, &filename, &bytes, &content_type)
        .await?;

    let record = DatabaseOperations::insert_file(
        &state.pool,
        PLACEHOLDER_USER_ID,
        project_id,
        &filename,
        file_type.as_str(),
        bytes.len() as i64,
        &storage_path,
        "processing",
    )
    .await?;

    if let Err(e) = run_processing_pipeline(&state, record.id, file_type, &bytes).await {
        error!(file_id = %record.id, "Processing failed: {}", e);
        DatabaseOperations::mark_file_failed(&state.pool, record.id, &e.to_string()).await?;
        return Err(e);
    }

    let storage_url = state.storage.file_url(&storage_path).await?;

    Ok((
        StatusCode::CREATED,
        Json(FileUploadResponse {
            file_id: record.id,
            storage_url,
            status: "completed".to_string(),
            message: "File uploaded and processed successfully".to_string(),
        }),
    ))
}

/// Run the format processor and persist its output. Tabular files are
/// cleaned before storage; documents and images store their extracted
/// payloads directly.
async fn run_processing_pipeline(
    state: &AppState,
    file_id: Uuid,
    file_type: FileType,
    bytes: &[u8],
) -> AppResult<()> {
    let processor = FileProcessor::new(state.llm.clone(), &state.config.llm.gemini_model);
    let mut processed = processor.process(file_type, bytes).await?;

    let (cleaned_data, data_schema) = match file_type {
        FileType::Csv | FileType::Excel => {
            let table = processed.table.take().ok_or_else(|| {
                AppError::Processing("Tabular processor produced no table".to_string())
            })?;
            let cleaned = DataCleaner::clean_table(&table);
            let schema = DataCleaner::detect_schema(&cleaned);
            let payload = json!({
                "columns": cleaned.columns,
                "data": cleaned.to_records(),
                "row_count": cleaned.row_count(),
            });
            processed.metadata["row_count"] = json!(cleaned.row_count());
            processed.table = Some(cleaned);
            (payload, json!(schema))
        }
        FileType::Pdf => {
            let text = processed.text.clone().unwrap_or_default();
            let page_count = processed
                .metadata
                .get("page_count")
                .cloned()
                .unwrap_or_else(|| json!(0));
            (
                json!({ "text": text, "page_count": page_count }),
                json!({ "type": "document" }),
            )
        }
        FileType::Image => (
            processed.extracted.clone().unwrap_or_else(|| json!({})),
            json!({ "type": "image" }),
        ),
    };

    let ai_summary = processor.generate_summary(&processed, file_type).await;

    DatabaseOperations::insert_processed_data(&state.pool, file_id, &cleaned_data, &data_schema)
        .await?;
    DatabaseOperations::mark_file_completed(&state.pool, file_id, &ai_summary, &processed.metadata)
        .await?;

    Ok(())
}

async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FileListQuery>,
) -> AppResult<Json<Vec<FileRecord>>> {
    let records = DatabaseOperations::list_files(&state.pool, query.project_id).await?;
    Ok(Json(records))
}

async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> AppResult<Json<FileRecord>> {
    let record = DatabaseOperations::get_file(&state.pool, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", file_id)))?;

    Ok(Json(record))
}
