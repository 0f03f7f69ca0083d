// Analysis endpoints: run the requested AI analyses over a file's
// processed tabular data and serve stored results.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::analysis::insights::InsightGenerator;
use crate::analysis::AiAnalyzer;
use crate::db::operations::DatabaseOperations;
use crate::models::{
    AnalysisRequest, AnalysisResponse, AnalysisResult, AnalysisResultRecord, AppState, ChartConfig,
};
use crate::processing::table::DataTable;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/analysis/generate", post(generate_analysis))
        .route("/api/v1/analysis/{file_id}", get(list_analysis))
        .with_state(state)
}

async fn generate_analysis(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> AppResult<(StatusCode, Json<AnalysisResponse>)> {
    if request.analysis_types.is_empty() {
        return Err(AppError::InvalidRequest(
            "At least one analysis type is required".to_string(),
        ));
    }

    let file = DatabaseOperations::get_file(&state.pool, request.file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", request.file_id)))?;

    if file.status != "completed" {
        return Err(AppError::InvalidRequest(format!(
            "File is not ready for analysis (status: {})",
            file.status
        )));
    }

    let processed = DatabaseOperations::get_processed_data(&state.pool, file.id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No processed data for file {}", file.id))
        })?;

    let table = table_from_cleaned(&processed.cleaned_data)?;

    // The executive summary prompt names the dataset
    let mut file_metadata = file.metadata.clone();
    file_metadata["name"] = json!(file.filename);

    let analyzer = AiAnalyzer::new(state.llm.clone(), &state.config.llm.gemini_model);
    let mut results = Vec::with_capacity(request.analysis_types.len());

    for analysis_type in &request.analysis_types {
        info!(file_id = %file.id, %analysis_type, "Running analysis");

        let raw = analyzer
            .analyze(*analysis_type, &table, &processed.data_schema, &file_metadata)
            .await;

        let insights = InsightGenerator::validate_insights(&raw);
        let chart_config = build_chart_config(*analysis_type, &raw, &insights);
        let metadata = InsightGenerator::enrich_metadata(&insights, &raw, *analysis_type);

        let chart_value = chart_config
            .as_ref()
            .and_then(|config| serde_json::to_value(config).ok());

        let record = DatabaseOperations::insert_analysis_result(
            &state.pool,
            file.id,
            &analysis_type.to_string(),
            &json!(insights),
            chart_value.as_ref(),
            raw.get("anomalies"),
            raw.get("key_metrics"),
            raw.get("recommendations"),
            &metadata,
        )
        .await?;

        results.push(to_api_result(record));
    }

    let message = format!("Generated {} analyses", results.len());
    Ok((
        StatusCode::CREATED,
        Json(AnalysisResponse {
            file_id: file.id,
            results,
            message,
        }),
    ))
}

async fn list_analysis(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> AppResult<Json<AnalysisResponse>> {
    let records = DatabaseOperations::list_analysis_results(&state.pool, file_id).await?;
    let results: Vec<AnalysisResult> = records.into_iter().map(to_api_result).collect();

    let message = format!("Retrieved {} analyses", results.len());
    Ok(Json(AnalysisResponse {
        file_id,
        results,
        message,
    }))
}

/// Rebuild the in-memory table from the stored cleaned payload.
fn table_from_cleaned(cleaned: &Value) -> AppResult<DataTable> {
    let columns: Vec<String> = cleaned
        .get("columns")
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .ok_or_else(|| {
            AppError::InvalidRequest("Analysis requires tabular data".to_string())
        })?;

    let records = cleaned
        .get("data")
        .and_then(|value| value.as_array())
        .ok_or_else(|| {
            AppError::InvalidRequest("Analysis requires tabular data".to_string())
        })?;

    Ok(DataTable::from_records(&columns, records))
}

/// Chart configuration from the model's chart data, when any was
/// returned. Anomaly payloads chart their detected points.
fn build_chart_config(
    analysis_type: crate::models::AnalysisType,
    raw: &Value,
    insights: &[crate::models::InsightItem],
) -> Option<ChartConfig> {
    let data = raw
        .get("chart_data")
        .or_else(|| raw.get("anomalies"))
        .and_then(|value| value.as_array())
        .filter(|items| !items.is_empty())?
        .clone();

    let recommended = raw.get("recommended_chart").and_then(|value| value.as_str());
    let chart_type = InsightGenerator::select_chart_type(analysis_type, recommended);

    let title = insights
        .first()
        .map(|insight| insight.title.as_str())
        .unwrap_or("Analysis");

    let config = InsightGenerator::generate_chart_config(chart_type, data, title, None);
    Some(InsightGenerator::apply_professional_styling(config))
}

fn to_api_result(record: AnalysisResultRecord) -> AnalysisResult {
    let insights = serde_json::from_value(record.insights.clone()).unwrap_or_default();
    let chart_config = record
        .chart_config
        .as_ref()
        .and_then(|value| serde_json::from_value::<ChartConfig>(value.clone()).ok());

    AnalysisResult {
        id: record.id,
        file_id: record.file_id,
        analysis_type: record.analysis_type,
        insights,
        chart_config,
        anomalies: record.anomalies,
        key_metrics: record.key_metrics,
        recommendations: record.recommendations,
        metadata: record.metadata,
        created_at: record.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisType, ChartType};

    #[test]
    fn test_table_from_cleaned_round_trip() {
        let cleaned = json!({
            "columns": ["month", "revenue"],
            "data": [
                {"month": "Jan", "revenue": 100},
                {"month": "Feb", "revenue": 120}
            ],
            "row_count": 2
        });

        let table = table_from_cleaned(&cleaned).unwrap();
        assert_eq!(table.columns, vec!["month", "revenue"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_table_from_cleaned_rejects_non_tabular() {
        let cleaned = json!({"text": "a pdf", "page_count": 3});
        assert!(table_from_cleaned(&cleaned).is_err());
    }

    #[test]
    fn test_chart_config_from_model_payload() {
        let raw = json!({
            "chart_data": [{"x": "Jan", "y": 100}],
            "recommended_chart": "line"
        });

        let config = build_chart_config(AnalysisType::Trend, &raw, &[]).unwrap();
        assert_eq!(config.chart_type, ChartType::Line);
        assert_eq!(config.title, "Analysis");
        assert!(!config.colors.is_empty());
    }

    #[test]
    fn test_chart_config_absent_without_data() {
        let raw = json!({"insights": [], "chart_data": []});
        assert!(build_chart_config(AnalysisType::Trend, &raw, &[]).is_none());
    }

    #[test]
    fn test_anomaly_payload_charts_detected_points() {
        let raw = json!({
            "anomalies": [{"index": 5, "value": 1000, "expected": 100}]
        });

        let config = build_chart_config(AnalysisType::Anomaly, &raw, &[]).unwrap();
        assert_eq!(config.chart_type, ChartType::Bar);
    }
}
