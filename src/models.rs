use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::llm::LLM;
use crate::storage::ObjectStorage;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub storage: ObjectStorage,
    pub llm: Arc<LLM>,
}

// Database records
// Note: FromRow is needed for runtime query_as (without DATABASE_URL at compile time)

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub project_id: Option<uuid::Uuid>,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub storage_path: String,
    pub status: String,
    pub ai_summary: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct ProcessedDataRecord {
    pub id: uuid::Uuid,
    pub file_id: uuid::Uuid,
    pub cleaned_data: serde_json::Value,
    pub data_schema: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct AnalysisResultRecord {
    pub id: uuid::Uuid,
    pub file_id: uuid::Uuid,
    pub analysis_type: String,
    pub insights: serde_json::Value,
    pub chart_config: Option<serde_json::Value>,
    pub anomalies: Option<serde_json::Value>,
    pub key_metrics: Option<serde_json::Value>,
    pub recommendations: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: uuid::Uuid,
    pub name: String,
    pub description: Option<String>,
    pub file_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// API Request/Response types

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileUploadResponse {
    pub file_id: uuid::Uuid,
    pub storage_url: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct FileListQuery {
    pub project_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Trend,
    Anomaly,
    ExecutiveSummary,
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisType::Trend => write!(f, "trend"),
            AnalysisType::Anomaly => write!(f, "anomaly"),
            AnalysisType::ExecutiveSummary => write!(f, "executive_summary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

/// Single AI-generated insight.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InsightItem {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Area,
}

/// Chart configuration consumed by the frontend charting layer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChartConfig {
    pub chart_type: ChartType,
    pub data: Vec<serde_json::Value>,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub colors: Vec<String>,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct AnalysisRequest {
    pub file_id: uuid::Uuid,
    pub analysis_types: Vec<AnalysisType>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalysisResult {
    pub id: uuid::Uuid,
    pub file_id: uuid::Uuid,
    pub analysis_type: String,
    pub insights: Vec<InsightItem>,
    pub chart_config: Option<ChartConfig>,
    pub anomalies: Option<serde_json::Value>,
    pub key_metrics: Option<serde_json::Value>,
    pub recommendations: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, serde::Serialize)]
pub struct AnalysisResponse {
    pub file_id: uuid::Uuid,
    pub results: Vec<AnalysisResult>,
    pub message: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_type_serde_round_trip() {
        let json = serde_json::to_string(&AnalysisType::ExecutiveSummary).unwrap();
        assert_eq!(json, "\"executive_summary\"");
        let parsed: AnalysisType = serde_json::from_str("\"trend\"").unwrap();
        assert_eq!(parsed, AnalysisType::Trend);
    }

    #[test]
    fn test_insight_defaults_to_medium_severity() {
        let insight: InsightItem =
            serde_json::from_str(r#"{"title": "t", "description": "d"}"#).unwrap();
        assert_eq!(insight.severity, Severity::Medium);
        assert!(insight.metric_value.is_none());
    }
}
