// AI-powered analysis over cleaned tabular data. Statistics are computed
// natively and handed to the model as grounding; the model is asked for
// strict-JSON insight payloads which are re-validated downstream.

pub mod insights;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::error;

use crate::llm::{LLMRequest, LLM};
use crate::models::AnalysisType;
use crate::processing::table::{CellValue, DataTable};
use crate::utils::{strip_code_fences, with_retry};

const ANALYSIS_TEMPERATURE: f32 = 0.2;
const LLM_MAX_ATTEMPTS: u32 = 3;
const ANALYSIS_MAX_OUTPUT_TOKENS: u32 = 2048;
const SAMPLE_ROWS_IN_PROMPT: usize = 10;
const OUTLIER_ZSCORE_THRESHOLD: f64 = 3.0;
const EXECUTIVE_METRIC_COLUMNS: usize = 5;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

pub struct AiAnalyzer {
    llm: Arc<LLM>,
    model: String,
}

impl AiAnalyzer {
    pub fn new(llm: Arc<LLM>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    pub async fn analyze(
        &self,
        analysis_type: AnalysisType,
        table: &DataTable,
        data_schema: &Value,
        file_metadata: &Value,
    ) -> Value {
        match analysis_type {
            AnalysisType::Trend => self.analyze_trends(table, data_schema).await,
            AnalysisType::Anomaly => self.detect_anomalies(table, data_schema).await,
            AnalysisType::ExecutiveSummary => {
                self.generate_executive_summary(table, data_schema, file_metadata)
                    .await
            }
        }
    }

    pub async fn analyze_trends(&self, table: &DataTable, data_schema: &Value) -> Value {
        let statistics = column_statistics(table);
        let sample = sample_records(table, SAMPLE_ROWS_IN_PROMPT);

        let prompt = format!(
            "Analyze this dataset for significant trends.\n\
             Schema: {schema}\n\
             Statistics: {stats}\n\
             Data sample: {sample}\n\n\
             Return ONLY valid JSON with this exact structure:\n\
             {{\n\
               \"insights\": [\n\
                 {{\"title\": \"Main trend identified\", \"description\": \"Detailed description with numbers\", \
                  \"severity\": \"high\", \"metric_value\": 123.45, \"metric_label\": \"metric label\"}}\n\
               ],\n\
               \"chart_data\": [{{\"x\": \"period\", \"y\": 100}}],\n\
               \"recommended_chart\": \"line\"\n\
             }}\n\n\
             Focus on: growth/decline, seasonality, inflection points.\n\
             Use severity: high for significant trends, medium for interesting patterns, low for minor observations.\n\
             Do not include markdown or extra text, JSON only.",
            schema = data_schema,
            stats = serde_json::to_string(&statistics).unwrap_or_default(),
            sample = serde_json::to_string(&sample).unwrap_or_default(),
        );

        match self.generate(&prompt).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error in trend analysis: {}", e);
                json!({
                    "insights": [{
                        "title": "Analysis unavailable",
                        "description": format!("Error during analysis: {}", e),
                        "severity": "low"
                    }],
                    "chart_data": [],
                    "recommended_chart": "bar"
                })
            }
        }
    }

    pub async fn detect_anomalies(&self, table: &DataTable, data_schema: &Value) -> Value {
        let (statistics, detected) = outlier_scan(table);
        let sample = sample_records(table, SAMPLE_ROWS_IN_PROMPT);

        let prompt = format!(
            "Identify anomalies and outliers in this dataset.\n\
             Schema: {schema}\n\
             Statistics: {stats}\n\
             Detected anomalies (Z-score > 3): {detected}\n\
             Data sample: {sample}\n\n\
             Return ONLY valid JSON with this structure:\n\
             {{\n\
               \"insights\": [\n\
                 {{\"title\": \"Anomaly detected\", \"description\": \"Detailed explanation with context\", \
                  \"severity\": \"high\", \"metric_value\": 456.78, \"metric_label\": \"standard deviation\"}}\n\
               ],\n\
               \"anomalies\": [{{\"index\": 5, \"value\": 1000, \"expected\": 100}}]\n\
             }}\n\n\
             Use statistical methods: Z-score, IQR, standard deviation.\n\
             Severity: high for critical anomalies, medium for significant outliers, low for minor variations.\n\
             Do not include markdown or extra text, JSON only.",
            schema = data_schema,
            stats = serde_json::to_string(&statistics).unwrap_or_default(),
            detected = serde_json::to_string(&detected).unwrap_or_default(),
            sample = serde_json::to_string(&sample).unwrap_or_default(),
        );

        match self.generate(&prompt).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error in anomaly detection: {}", e);
                json!({
                    "insights": [{
                        "title": "Anomaly analysis unavailable",
                        "description": format!("Error during detection: {}", e),
                        "severity": "low"
                    }],
                    "anomalies": []
                })
            }
        }
    }

    pub async fn generate_executive_summary(
        &self,
        table: &DataTable,
        data_schema: &Value,
        file_metadata: &Value,
    ) -> Value {
        let key_metrics = executive_metrics(table);
        let date_range = date_range(table);
        let sample = sample_records(table, 5);
        let file_name = file_metadata
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown");

        let prompt = format!(
            "Create a professional executive summary.\n\
             Dataset: {name}\n\
             Schema: {schema}\n\
             Period: {period}\n\
             Total rows: {rows}\n\
             Key metrics: {metrics}\n\
             Data sample: {sample}\n\n\
             Return ONLY valid JSON with this structure:\n\
             {{\n\
               \"insights\": [\n\
                 {{\"title\": \"Key Takeaway #1\", \"description\": \"So what? Business implication with concrete numbers\", \"severity\": \"high\"}},\n\
                 {{\"title\": \"Key Takeaway #2\", \"description\": \"Second relevant insight\", \"severity\": \"medium\"}}\n\
               ],\n\
               \"key_metrics\": [\n\
                 {{\"label\": \"Main metric\", \"value\": 12345, \"change\": \"+15%\"}},\n\
                 {{\"label\": \"Second metric\", \"value\": 67890, \"change\": \"-5%\"}}\n\
               ],\n\
               \"recommendations\": [\n\
                 \"Concrete action #1 with estimated impact\",\n\
                 \"Concrete action #2 based on the data\"\n\
               ]\n\
             }}\n\n\
             Language: executive, quantitative, action-oriented.\n\
             Structure: situation, complication, resolution.\n\
             Focus on strategic insights, business implications, concrete actions.\n\
             Do not include markdown or extra text, JSON only.",
            name = file_name,
            schema = data_schema,
            period = date_range,
            rows = table.row_count(),
            metrics = serde_json::to_string(&key_metrics).unwrap_or_default(),
            sample = serde_json::to_string(&sample).unwrap_or_default(),
        );

        match self.generate(&prompt).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error in executive summary generation: {}", e);
                json!({
                    "insights": [{
                        "title": "Executive summary unavailable",
                        "description": format!("Error during generation: {}", e),
                        "severity": "low"
                    }],
                    "key_metrics": [],
                    "recommendations": []
                })
            }
        }
    }

    async fn generate(&self, prompt: &str) -> crate::types::AppResult<Value> {
        let request = LLMRequest::text(&self.model, prompt)
            .with_temperature(ANALYSIS_TEMPERATURE)
            .with_max_output_tokens(ANALYSIS_MAX_OUTPUT_TOKENS);

        let response =
            with_retry(|| self.llm.generate_content(&request), LLM_MAX_ATTEMPTS).await?;
        Ok(parse_json_response(&response.content))
    }
}

/// Parse a model response that was asked to be strict JSON, tolerating
/// markdown fences. Unparseable output degrades to a minimal insight
/// payload instead of failing the request.
pub fn parse_json_response(text: &str) -> Value {
    let stripped = strip_code_fences(text);
    match serde_json::from_str(stripped) {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to parse JSON response: {}", e);
            json!({
                "insights": [{
                    "title": "Parsing error",
                    "description": "The AI response is not valid JSON",
                    "severity": "low"
                }]
            })
        }
    }
}

pub fn column_statistics(table: &DataTable) -> BTreeMap<String, ColumnStats> {
    let mut statistics = BTreeMap::new();

    for idx in table.numeric_column_indices() {
        let values = table.numeric_column(idx);
        if values.is_empty() {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std = std_dev(&values, mean);

        statistics.insert(
            table.columns[idx].clone(),
            ColumnStats { mean, min, max, std },
        );
    }

    statistics
}

/// Per-column z-score outlier scan. Returns the statistics used plus the
/// columns where any value deviated more than the threshold.
pub fn outlier_scan(table: &DataTable) -> (Value, Vec<Value>) {
    let mut statistics = serde_json::Map::new();
    let mut detected = Vec::new();

    for idx in table.numeric_column_indices() {
        let values = table.numeric_column(idx);
        if values.len() < 2 {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let std = std_dev(&values, mean);
        let column = &table.columns[idx];

        if std > 0.0 {
            let mut outlier_count = 0usize;
            let mut max_zscore = 0f64;
            for value in &values {
                let z = ((value - mean) / std).abs();
                if z > OUTLIER_ZSCORE_THRESHOLD {
                    outlier_count += 1;
                }
                max_zscore = max_zscore.max(z);
            }

            statistics.insert(
                column.clone(),
                json!({ "mean": mean, "std": std, "outlier_count": outlier_count }),
            );

            if outlier_count > 0 {
                detected.push(json!({
                    "column": column,
                    "count": outlier_count,
                    "max_zscore": max_zscore,
                }));
            }
        } else {
            // Zero spread, every value identical
            statistics.insert(
                column.clone(),
                json!({ "mean": mean, "std": 0.0, "outlier_count": 0 }),
            );
        }
    }

    (Value::Object(statistics), detected)
}

fn executive_metrics(table: &DataTable) -> Value {
    let mut metrics = serde_json::Map::new();

    for idx in table
        .numeric_column_indices()
        .into_iter()
        .take(EXECUTIVE_METRIC_COLUMNS)
    {
        let values = table.numeric_column(idx);
        if values.is_empty() {
            continue;
        }
        metrics.insert(
            table.columns[idx].clone(),
            json!({
                "total": values.iter().sum::<f64>(),
                "average": values.iter().sum::<f64>() / values.len() as f64,
                "max": values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                "min": values.iter().copied().fold(f64::INFINITY, f64::min),
            }),
        );
    }

    Value::Object(metrics)
}

fn date_range(table: &DataTable) -> String {
    let mut min_date: Option<chrono::NaiveDateTime> = None;
    let mut max_date: Option<chrono::NaiveDateTime> = None;

    for row in &table.rows {
        for cell in row {
            if let CellValue::DateTime(dt) = cell {
                min_date = Some(min_date.map_or(*dt, |current| current.min(*dt)));
                max_date = Some(max_date.map_or(*dt, |current| current.max(*dt)));
            }
        }
    }

    match (min_date, max_date) {
        (Some(min), Some(max)) => format!("{} to {}", min.date(), max.date()),
        _ => "N/A".to_string(),
    }
}

fn sample_records(table: &DataTable, limit: usize) -> Vec<Value> {
    table.to_records().into_iter().take(limit).collect()
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_table(values: &[f64]) -> DataTable {
        DataTable {
            columns: vec!["amount".to_string()],
            rows: values.iter().map(|v| vec![CellValue::Float(*v)]).collect(),
        }
    }

    #[test]
    fn test_column_statistics() {
        let table = numeric_table(&[10.0, 20.0, 30.0]);
        let stats = column_statistics(&table);
        let amount = &stats["amount"];

        assert!((amount.mean - 20.0).abs() < 1e-9);
        assert_eq!(amount.min, 10.0);
        assert_eq!(amount.max, 30.0);
        assert!((amount.std - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_scan_flags_extreme_values() {
        let mut values = vec![10.0; 30];
        values.extend_from_slice(&[10.1, 9.9, 500.0]);
        let table = numeric_table(&values);

        let (stats, detected) = outlier_scan(&table);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0]["column"], "amount");
        assert_eq!(stats["amount"]["outlier_count"], 1);
    }

    #[test]
    fn test_outlier_scan_handles_zero_spread() {
        let table = numeric_table(&[5.0, 5.0, 5.0]);
        let (stats, detected) = outlier_scan(&table);

        assert!(detected.is_empty());
        assert_eq!(stats["amount"]["std"], 0.0);
    }

    #[test]
    fn test_parse_json_response_accepts_fenced_output() {
        let parsed = parse_json_response("```json\n{\"insights\": []}\n```");
        assert!(parsed["insights"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_parse_json_response_degrades_gracefully() {
        let parsed = parse_json_response("I could not produce JSON, sorry");
        let insights = parsed["insights"].as_array().unwrap();
        assert_eq!(insights[0]["title"], "Parsing error");
    }

    #[test]
    fn test_date_range_formats_bounds() {
        let date = |d: u32| {
            CellValue::DateTime(
                chrono::NaiveDate::from_ymd_opt(2024, 1, d)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            )
        };
        let table = DataTable {
            columns: vec!["day".to_string()],
            rows: vec![vec![date(5)], vec![date(1)], vec![date(9)]],
        };

        assert_eq!(date_range(&table), "2024-01-01 to 2024-01-09");
        assert_eq!(date_range(&numeric_table(&[1.0])), "N/A");
    }
}
