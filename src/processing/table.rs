// In-memory tabular representation shared by the processors, the cleaner and the analyzer.

use chrono::NaiveDateTime;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view used by the statistics helpers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Integer(v) => json!(v),
            CellValue::Float(v) => {
                if v.is_finite() {
                    json!(v)
                } else {
                    Value::Null
                }
            }
            CellValue::Boolean(v) => json!(v),
            CellValue::DateTime(v) => json!(v.format("%Y-%m-%dT%H:%M:%S").to_string()),
            CellValue::Text(v) => json!(v),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Non-null numeric values of one column.
    pub fn numeric_column(&self, index: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index).and_then(|c| c.as_f64()))
            .collect()
    }

    /// Columns where at least one value is numeric.
    pub fn numeric_column_indices(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|idx| self.rows.iter().any(|row| row.get(*idx).is_some_and(|c| c.as_f64().is_some())))
            .collect()
    }

    /// Serialize rows as a JSON array of objects keyed by column name,
    /// the shape stored in `processed_data.cleaned_data`.
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (idx, column) in self.columns.iter().enumerate() {
                    let value = row.get(idx).map(|c| c.to_json()).unwrap_or(Value::Null);
                    obj.insert(column.clone(), value);
                }
                Value::Object(obj)
            })
            .collect()
    }

    /// Rebuild a table from stored records. Values come back with JSON types
    /// only, which is sufficient for the analysis passes.
    pub fn from_records(columns: &[String], records: &[Value]) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| match record.get(column) {
                        None | Some(Value::Null) => CellValue::Null,
                        Some(Value::Bool(b)) => CellValue::Boolean(*b),
                        Some(Value::Number(n)) => {
                            if let Some(i) = n.as_i64() {
                                CellValue::Integer(i)
                            } else {
                                CellValue::Float(n.as_f64().unwrap_or(f64::NAN))
                            }
                        }
                        Some(Value::String(s)) => CellValue::Text(s.clone()),
                        Some(other) => CellValue::Text(other.to_string()),
                    })
                    .collect()
            })
            .collect();

        Self {
            columns: columns.to_vec(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> DataTable {
        DataTable {
            columns: vec!["region".to_string(), "revenue".to_string()],
            rows: vec![
                vec![CellValue::Text("north".to_string()), CellValue::Float(120.5)],
                vec![CellValue::Text("south".to_string()), CellValue::Null],
                vec![CellValue::Text("east".to_string()), CellValue::Integer(90)],
            ],
        }
    }

    #[test]
    fn test_numeric_column_skips_nulls_and_text() {
        let table = sample_table();
        let values = table.numeric_column(1);
        assert_eq!(values, vec![120.5, 90.0]);
        assert!(table.numeric_column(0).is_empty());
    }

    #[test]
    fn test_records_round_trip() {
        let table = sample_table();
        let records = table.to_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["region"], "north");
        assert_eq!(records[1]["revenue"], Value::Null);

        let rebuilt = DataTable::from_records(&table.columns, &records);
        assert_eq!(rebuilt.row_count(), 3);
        assert_eq!(rebuilt.rows[2][1], CellValue::Integer(90));
    }

    #[test]
    fn test_non_finite_floats_serialize_as_null() {
        assert_eq!(CellValue::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(CellValue::Float(1.5).to_json(), serde_json::json!(1.5));
    }
}
