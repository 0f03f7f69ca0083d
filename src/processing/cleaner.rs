// Data cleaning and normalization over extracted tables:
// drops empty rows, standardizes headers, dedupes, infers column types.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::processing::table::{CellValue, DataTable};

// Conversion sticks only when more than half of the non-null values agree.
const TYPE_MAJORITY_THRESHOLD: f64 = 0.5;

pub struct DataCleaner;

impl DataCleaner {
    pub fn clean_table(table: &DataTable) -> DataTable {
        let mut cleaned = table.clone();

        // Remove completely empty rows
        cleaned.rows.retain(|row| !row.iter().all(|cell| cell.is_null()));

        cleaned.columns = Self::normalize_headers(&cleaned.columns);

        Self::dedupe_rows(&mut cleaned);
        Self::infer_and_convert_types(&mut cleaned);

        cleaned
    }

    /// Standardize column names: lowercase, spaces to underscores, strip
    /// anything outside [a-z0-9_], collapse runs of underscores. Empty
    /// names become positional `column_N` placeholders.
    pub fn normalize_headers(columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let mut name = String::with_capacity(column.len());
                let mut last_underscore = false;
                for ch in column.to_lowercase().chars() {
                    let mapped = if ch == ' ' { '_' } else { ch };
                    if mapped == '_' {
                        if !last_underscore {
                            name.push('_');
                        }
                        last_underscore = true;
                    } else if mapped.is_ascii_lowercase() || mapped.is_ascii_digit() {
                        name.push(mapped);
                        last_underscore = false;
                    }
                }
                let name = name.trim_matches('_').to_string();
                if name.is_empty() {
                    format!("column_{}", idx)
                } else {
                    name
                }
            })
            .collect()
    }

    fn dedupe_rows(table: &mut DataTable) {
        let mut seen = std::collections::HashSet::new();
        table.rows.retain(|row| {
            let key = row
                .iter()
                .map(|cell| format!("{:?}", cell))
                .collect::<Vec<_>>()
                .join("\u{1f}");
            seen.insert(key)
        });
    }

    fn infer_and_convert_types(table: &mut DataTable) {
        for col_idx in 0..table.columns.len() {
            let mut total = 0usize;
            let mut numeric = 0usize;
            let mut datetime = 0usize;

            for row in &table.rows {
                let Some(cell) = row.get(col_idx) else { continue };
                match cell {
                    CellValue::Null => {}
                    CellValue::Integer(_) | CellValue::Float(_) => {
                        total += 1;
                        numeric += 1;
                    }
                    CellValue::DateTime(_) => {
                        total += 1;
                        datetime += 1;
                    }
                    CellValue::Boolean(_) => total += 1,
                    CellValue::Text(text) => {
                        total += 1;
                        if parse_numeric(text).is_some() {
                            numeric += 1;
                        } else if parse_datetime(text).is_some() {
                            datetime += 1;
                        }
                    }
                }
            }

            if total == 0 {
                continue;
            }

            let threshold = (total as f64 * TYPE_MAJORITY_THRESHOLD) as usize;
            if numeric > threshold {
                Self::convert_column(table, col_idx, |text| parse_numeric(text));
            } else if datetime > threshold {
                Self::convert_column(table, col_idx, |text| {
                    parse_datetime(text).map(CellValue::DateTime)
                });
            }
        }
    }

    fn convert_column<F>(table: &mut DataTable, col_idx: usize, convert: F)
    where
        F: Fn(&str) -> Option<CellValue>,
    {
        for row in &mut table.rows {
            if let Some(cell) = row.get_mut(col_idx) {
                if let CellValue::Text(text) = cell {
                    // Unconvertible stragglers in a converted column become nulls
                    *cell = convert(text).unwrap_or(CellValue::Null);
                }
            }
        }
    }

    /// Column name to detected type, stored as `processed_data.data_schema`.
    pub fn detect_schema(table: &DataTable) -> BTreeMap<String, String> {
        let mut schema = BTreeMap::new();

        for (col_idx, column) in table.columns.iter().enumerate() {
            let mut kind = "string";
            for row in &table.rows {
                match row.get(col_idx) {
                    Some(CellValue::Integer(_)) => {
                        kind = "integer";
                        break;
                    }
                    Some(CellValue::Float(_)) => {
                        kind = "float";
                        break;
                    }
                    Some(CellValue::Boolean(_)) => {
                        kind = "boolean";
                        break;
                    }
                    Some(CellValue::DateTime(_)) => {
                        kind = "datetime";
                        break;
                    }
                    Some(CellValue::Text(_)) => break,
                    _ => {}
                }
            }
            schema.insert(column.clone(), kind.to_string());
        }

        schema
    }
}

fn parse_numeric(text: &str) -> Option<CellValue> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(CellValue::Integer(int));
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite()).map(CellValue::Float)
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
        "%d/%m/%Y",
        "%m/%d/%Y",
    ];

    for format in FORMATS {
        if format.contains("%H") {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Some(dt);
            }
        } else if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}
