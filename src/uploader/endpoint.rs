// Collaborator seams for the upload queue: the transfer endpoint that
// accepts file bytes and the metadata store that reports processing
// status. HTTP implementations target the backend's own API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use uuid::Uuid;

/// Acknowledgement returned by the transfer endpoint on success.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub file_id: Uuid,
    pub storage_url: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
}

#[async_trait]
pub trait TransferEndpoint: Send + Sync {
    async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        project_id: Option<Uuid>,
    ) -> Result<UploadReceipt>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn fetch_status(&self, file_id: Uuid) -> Result<ProcessingStatus>;
}

/// Multipart upload against `POST {base}/api/v1/files/upload`.
pub struct HttpTransferEndpoint {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransferEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl TransferEndpoint for HttpTransferEndpoint {
    async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        project_id: Option<Uuid>,
    ) -> Result<UploadReceipt> {
        let mime = mime_guess::from_path(filename)
            .first_or_octet_stream()
            .to_string();

        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(&mime)
            .context("Invalid content type for upload")?;

        let mut form = multipart::Form::new().part("file", part);
        if let Some(project) = project_id {
            form = form.text("project_id", project.to_string());
        }

        let response = self
            .client
            .post(format!("{}/api/v1/files/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("Upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{}", error_detail(status, &body));
        }

        response
            .json::<UploadReceipt>()
            .await
            .context("Failed to parse upload response")
    }
}

/// Status lookups against `GET {base}/api/v1/files/{id}`.
pub struct HttpMetadataStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: trim_base(base_url),
        }
    }
}

#[derive(Deserialize)]
struct FileStatusResponse {
    status: String,
}

#[async_trait]
impl MetadataStore for HttpMetadataStore {
    async fn fetch_status(&self, file_id: Uuid) -> Result<ProcessingStatus> {
        let response = self
            .client
            .get(format!("{}/api/v1/files/{}", self.base_url, file_id))
            .send()
            .await
            .context("Status request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{}", error_detail(status, &body));
        }

        let parsed: FileStatusResponse = response
            .json()
            .await
            .context("Failed to parse status response")?;

        Ok(match parsed.status.as_str() {
            "completed" => ProcessingStatus::Completed,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Processing,
        })
    }
}

fn trim_base(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

/// Prefer the backend's `{"detail": ...}` body over a bare status line.
fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail").and_then(|d| d.as_str()) {
            return detail.to_string();
        }
    }
    if body.is_empty() {
        format!("Upload endpoint returned {}", status)
    } else {
        format!("Upload endpoint returned {}: {}", status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_prefers_backend_detail() {
        let body = r#"{"detail": "File too large (60 MiB). Maximum size: 50 MiB"}"#;
        let message = error_detail(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(message, "File too large (60 MiB). Maximum size: 50 MiB");
    }

    #[test]
    fn test_error_detail_falls_back_to_status() {
        let message = error_detail(reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(message.contains("502"));
    }

    #[tokio::test]
    async fn test_http_endpoint_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let file_id = Uuid::new_v4();
        server
            .mock("POST", "/api/v1/files/upload")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"file_id": "{}", "storage_url": "https://example/object", "status": "completed", "message": "ok"}}"#,
                file_id
            ))
            .create_async()
            .await;

        let endpoint = HttpTransferEndpoint::new(server.url());
        let receipt = endpoint
            .upload("report.csv", b"a,b\n1,2\n".to_vec(), None)
            .await
            .unwrap();

        assert_eq!(receipt.file_id, file_id);
        assert_eq!(receipt.status, "completed");
    }

    #[tokio::test]
    async fn test_http_store_maps_statuses() {
        let mut server = mockito::Server::new_async().await;
        let file_id = Uuid::new_v4();
        server
            .mock("GET", format!("/api/v1/files/{}", file_id).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "failed", "filename": "a.csv"}"#)
            .create_async()
            .await;

        let store = HttpMetadataStore::new(server.url());
        let status = store.fetch_status(file_id).await.unwrap();
        assert_eq!(status, ProcessingStatus::Failed);
    }
}
