// Post-processing of AI-generated analysis output: validation into typed
// insights, chart configuration, and metadata enrichment.

use serde_json::{json, Value};
use tracing::warn;

use crate::models::{AnalysisType, ChartConfig, ChartType, InsightItem, Severity};

// Professional palette applied to every chart
pub const PROFESSIONAL_COLORS: [&str; 5] = ["#1e40af", "#0f172a", "#475569", "#3b82f6", "#60a5fa"];

pub struct InsightGenerator;

impl InsightGenerator {
    /// Convert the raw model payload into validated insight items. Items
    /// that cannot be read become low-severity placeholders rather than
    /// dropping silently.
    pub fn validate_insights(raw: &Value) -> Vec<InsightItem> {
        let Some(items) = raw.get("insights").and_then(|v| v.as_array()) else {
            return Vec::new();
        };

        items
            .iter()
            .map(|item| {
                if !item.is_object() {
                    warn!("Failed to validate insight: {}", item);
                    return InsightItem {
                        title: "Invalid insight".to_string(),
                        description: "Could not process this insight".to_string(),
                        severity: Severity::Low,
                        metric_value: None,
                        metric_label: None,
                    };
                }

                InsightItem {
                    title: item
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Untitled Insight")
                        .to_string(),
                    description: item
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or("No description available")
                        .to_string(),
                    severity: item
                        .get("severity")
                        .and_then(|v| serde_json::from_value(v.clone()).ok())
                        .unwrap_or_default(),
                    metric_value: item.get("metric_value").and_then(|v| v.as_f64()),
                    metric_label: item
                        .get("metric_label")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                }
            })
            .collect()
    }

    /// Pick a chart type: trust a valid model recommendation, otherwise
    /// fall back by analysis type.
    pub fn select_chart_type(analysis_type: AnalysisType, recommended: Option<&str>) -> ChartType {
        if let Some(recommended) = recommended {
            if let Ok(chart) = serde_json::from_value::<ChartType>(json!(recommended)) {
                return chart;
            }
        }

        match analysis_type {
            AnalysisType::Trend => ChartType::Line,
            AnalysisType::Anomaly | AnalysisType::ExecutiveSummary => ChartType::Bar,
        }
    }

    pub fn generate_chart_config(
        chart_type: ChartType,
        data: Vec<Value>,
        title: &str,
        description: Option<&str>,
    ) -> ChartConfig {
        // Axes come from the first data point's keys
        let (x_axis, y_axis) = match data.first().and_then(|v| v.as_object()) {
            Some(obj) => {
                let keys: Vec<&String> = obj.keys().collect();
                (
                    keys.first().map(|k| k.to_string()),
                    keys.get(1).map(|k| k.to_string()),
                )
            }
            None => (None, None),
        };

        ChartConfig {
            chart_type,
            data,
            x_axis,
            y_axis,
            colors: PROFESSIONAL_COLORS.iter().map(|c| c.to_string()).collect(),
            title: title.to_string(),
            description: description.map(|s| s.to_string()),
        }
    }

    pub fn apply_professional_styling(mut config: ChartConfig) -> ChartConfig {
        config.colors = PROFESSIONAL_COLORS.iter().map(|c| c.to_string()).collect();
        if config.title.is_empty() {
            config.title = "Analysis Chart".to_string();
        }
        config
    }

    /// Quality indicators stored alongside each analysis result.
    pub fn enrich_metadata(
        insights: &[InsightItem],
        raw: &Value,
        analysis_type: AnalysisType,
    ) -> Value {
        let high_severity_count = insights
            .iter()
            .filter(|i| i.severity == Severity::High)
            .count();

        let mut confidence_score: f64 = 0.5;
        if !insights.is_empty() {
            confidence_score += 0.2;
        }
        if high_severity_count > 0 {
            confidence_score += 0.3;
        }

        json!({
            "analysis_type": analysis_type.to_string(),
            "insight_count": insights.len(),
            "high_severity_count": high_severity_count,
            "has_recommendations": raw.get("recommendations").is_some(),
            "has_chart_data": raw.get("chart_data").is_some() || raw.get("anomalies").is_some(),
            "confidence_score": confidence_score.min(1.0),
        })
    }
}
