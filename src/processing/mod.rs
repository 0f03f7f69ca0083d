// Format-specific file processing and upload validation.
// CSV and Excel become DataTables, PDFs become extracted text, images go
// through the vision model. Validation is pure: the same filename and size
// always classify the same way.

pub mod cleaner;
pub mod image;
pub mod table;

use std::io::Cursor;
use std::sync::Arc;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::{json, Value};
use tracing::warn;

use crate::llm::{LLMRequest, LLM};
use crate::types::{AppError, AppResult};
use table::{CellValue, DataTable};

/// Fixed upload allow-list.
pub const ALLOWED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls", "pdf", "png", "jpg", "jpeg"];

/// Fixed upload ceiling: 50 MiB.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const SUMMARY_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Excel,
    Pdf,
    Image,
}

impl FileType {
    pub fn from_filename(filename: &str) -> Option<Self> {
        match file_extension(filename)?.as_str() {
            "csv" => Some(FileType::Csv),
            "xlsx" | "xls" => Some(FileType::Excel),
            "pdf" => Some(FileType::Pdf),
            "png" | "jpg" | "jpeg" => Some(FileType::Image),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Excel => "excel",
            FileType::Pdf => "pdf",
            FileType::Image => "image",
        }
    }
}

pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Validate a candidate upload against the extension allow-list and the
/// size ceiling. Returns the detected file type, or a human-readable
/// rejection reason naming the violated rule.
pub fn validate_upload(filename: &str, size: u64) -> Result<FileType, String> {
    let file_type = match FileType::from_filename(filename) {
        Some(ft) => ft,
        None => {
            let shown = file_extension(filename)
                .map(|ext| format!(".{}", ext))
                .unwrap_or_else(|| "missing extension".to_string());
            return Err(format!(
                "File type not allowed ({}). Supported: {}",
                shown,
                ALLOWED_EXTENSIONS.join(", ")
            ));
        }
    };

    if size > MAX_FILE_SIZE {
        return Err(format!(
            "File too large ({} bytes). Maximum size: {} MiB",
            size,
            MAX_FILE_SIZE / (1024 * 1024)
        ));
    }

    Ok(file_type)
}

/// Output of a format processor; at most one of the payload fields is set
/// depending on the file type.
#[derive(Debug, Clone, Default)]
pub struct ProcessedFile {
    pub table: Option<DataTable>,
    pub text: Option<String>,
    pub extracted: Option<Value>,
    pub metadata: Value,
}

pub struct FileProcessor {
    llm: Arc<LLM>,
    model: String,
}

impl FileProcessor {
    pub fn new(llm: Arc<LLM>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    pub async fn process(&self, file_type: FileType, bytes: &[u8]) -> AppResult<ProcessedFile> {
        match file_type {
            FileType::Csv => Self::process_csv(bytes),
            FileType::Excel => Self::process_excel(bytes),
            FileType::Pdf => self.process_pdf(bytes).await,
            FileType::Image => self.process_image(bytes).await,
        }
    }

    pub fn process_csv(bytes: &[u8]) -> AppResult<ProcessedFile> {
        // Lossy conversion stands in for the encoding-fallback chain;
        // malformed sequences degrade to replacement characters instead of failing the upload
        let text = String::from_utf8_lossy(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::Processing(format!("Failed to process CSV file: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if columns.is_empty() {
            return Err(AppError::Processing(
                "Failed to process CSV file: no columns detected".to_string(),
            ));
        }

        let mut table = DataTable::new(columns);
        for record in reader.records() {
            let record =
                record.map_err(|e| AppError::Processing(format!("Failed to process CSV file: {}", e)))?;
            let row = (0..table.columns.len())
                .map(|idx| match record.get(idx) {
                    None | Some("") => CellValue::Null,
                    Some(value) => CellValue::Text(value.to_string()),
                })
                .collect();
            table.rows.push(row);
        }

        let metadata = json!({
            "row_count": table.row_count(),
            "column_count": table.column_count(),
            "columns": table.columns,
        });

        Ok(ProcessedFile {
            table: Some(table),
            metadata,
            ..Default::default()
        })
    }

    pub fn process_excel(bytes: &[u8]) -> AppResult<ProcessedFile> {
        let cursor = Cursor::new(bytes.to_vec());
        let mut workbook = open_workbook_auto_from_rs(cursor)
            .map_err(|e| AppError::Processing(format!("Failed to process Excel file: {}", e)))?;

        let sheet_names = workbook.sheet_names().to_vec();
        let first_sheet = sheet_names
            .first()
            .cloned()
            .ok_or_else(|| AppError::Processing("Failed to process Excel file: no sheets".to_string()))?;

        let range = workbook
            .worksheet_range(&first_sheet)
            .map_err(|e| AppError::Processing(format!("Failed to process Excel file: {}", e)))?;

        let mut rows = range.rows();
        let columns: Vec<String> = rows
            .next()
            .map(|header| header.iter().map(|cell| cell.to_string()).collect())
            .unwrap_or_default();

        if columns.is_empty() {
            return Err(AppError::Processing(
                "Failed to process Excel file: empty sheet".to_string(),
            ));
        }

        let mut table = DataTable::new(columns);
        for row in rows {
            let cells = (0..table.columns.len())
                .map(|idx| match row.get(idx) {
                    None | Some(Data::Empty) | Some(Data::Error(_)) => CellValue::Null,
                    Some(Data::Int(v)) => CellValue::Integer(*v),
                    Some(Data::Float(v)) => CellValue::Float(*v),
                    Some(Data::Bool(v)) => CellValue::Boolean(*v),
                    Some(Data::String(v)) => {
                        if v.is_empty() {
                            CellValue::Null
                        } else {
                            CellValue::Text(v.clone())
                        }
                    }
                    Some(other) => CellValue::Text(other.to_string()),
                })
                .collect();
            table.rows.push(cells);
        }

        let mut metadata = json!({
            "row_count": table.row_count(),
            "column_count": table.column_count(),
            "columns": table.columns,
        });
        if sheet_names.len() > 1 {
            metadata["total_sheets"] = json!(sheet_names.len());
            metadata["sheet_names"] = json!(sheet_names);
            metadata["active_sheet"] = json!(first_sheet);
        }

        Ok(ProcessedFile {
            table: Some(table),
            metadata,
            ..Default::default()
        })
    }

    pub async fn process_pdf(&self, bytes: &[u8]) -> AppResult<ProcessedFile> {
        let document = lopdf::Document::load_mem(bytes)
            .map_err(|e| AppError::Processing(format!("Failed to process PDF file: {}", e)))?;

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let page_count = page_numbers.len();

        let mut text = document.extract_text(&page_numbers).unwrap_or_default();

        // Scanned PDFs have no embedded text; fall back to vision OCR
        if text.trim().is_empty() {
            text = self.extract_pdf_with_vision(bytes).await?;
        }

        Ok(ProcessedFile {
            text: Some(text.trim().to_string()),
            metadata: json!({ "page_count": page_count }),
            ..Default::default()
        })
    }

    async fn extract_pdf_with_vision(&self, bytes: &[u8]) -> AppResult<String> {
        let prompt = "Extract all text from this PDF document. \
            Return the text exactly as it appears, maintaining the original formatting and line breaks. \
            If there are tables, preserve their structure.";

        let request =
            LLMRequest::with_inline_data(&self.model, prompt, "application/pdf", bytes);
        let response = self.llm.generate_content(&request).await?;

        if response.content.trim().is_empty() {
            Ok("[No text could be extracted]".to_string())
        } else {
            Ok(response.content)
        }
    }

    pub async fn process_image(&self, bytes: &[u8]) -> AppResult<ProcessedFile> {
        let (format, dimensions) = image::probe(bytes)?;

        let prompt = "Extract structured data from this image. \
            If it contains tables, return JSON with column headers and rows. \
            If it's a chart or graph, describe the data points in structured format. \
            Return valid JSON only.";

        let request = LLMRequest::with_inline_data(&self.model, prompt, format.mime_type(), bytes);
        let response = self.llm.generate_content(&request).await?;

        let stripped = crate::utils::strip_code_fences(&response.content);
        let extracted = match serde_json::from_str::<Value>(stripped) {
            Ok(value) => value,
            Err(_) => {
                warn!("Vision extraction returned non-JSON output");
                json!({ "extracted_text": response.content, "type": "unstructured" })
            }
        };

        Ok(ProcessedFile {
            extracted: Some(extracted),
            metadata: json!({
                "image_dimensions": { "width": dimensions.width, "height": dimensions.height },
                "image_format": format.as_str(),
            }),
            ..Default::default()
        })
    }

    /// AI-generated two-sentence summary of the processed payload.
    /// Summary failures degrade to an explanatory string rather than
    /// failing the whole upload, matching the upload pipeline's contract.
    pub async fn generate_summary(&self, processed: &ProcessedFile, file_type: FileType) -> String {
        let prompt = match file_type {
            FileType::Csv | FileType::Excel => {
                let Some(table) = &processed.table else {
                    return "Empty dataset".to_string();
                };
                if table.row_count() == 0 {
                    return "Empty dataset".to_string();
                }
                let sample: Vec<Value> = table.to_records().into_iter().take(5).collect();
                format!(
                    "Analyze this dataset. Provide a 2-sentence summary describing: \
                     (1) what type of data this is, (2) the time period or scope covered. \
                     Columns: {:?}. Data sample: {}",
                    table.columns,
                    serde_json::to_string(&sample).unwrap_or_default()
                )
            }
            FileType::Pdf => {
                let text: String = processed
                    .text
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(500)
                    .collect();
                format!(
                    "Summarize this document in 2 sentences. \
                     Focus on the document type and main topic. Text: {}",
                    text
                )
            }
            FileType::Image => {
                format!(
                    "Describe what data or information this image contains in 1-2 sentences. \
                     Extracted data: {}",
                    processed
                        .extracted
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                )
            }
        };

        let request = LLMRequest::text(&self.model, prompt).with_temperature(SUMMARY_TEMPERATURE);
        match self.llm.generate_content(&request).await {
            Ok(response) => response.content.trim().to_string(),
            Err(e) => format!("Failed to generate AI summary: {}", e),
        }
    }
}
