// S3-compatible object storage for uploaded files.
// Objects are keyed as {user_id}/{uuid}/{filename} so a display name can
// repeat without collisions; reads go through short-lived presigned URLs.

use s3::creds::Credentials;
use s3::{Bucket, Region};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::types::{AppError, AppResult};

#[derive(Clone)]
pub struct ObjectStorage {
    bucket: Bucket,
    presign_expiry_secs: u32,
}

impl ObjectStorage {
    pub fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config.region.parse()?,
        };

        let credentials = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                Credentials::new(Some(access_key), Some(secret_key), None, None, None)?
            }
            // Fall back to the ambient credential chain (env vars, profile)
            _ => Credentials::default()?,
        };

        let mut bucket = Bucket::new(&config.bucket, region, credentials)?;
        if config.endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            presign_expiry_secs: config.presign_expiry_secs,
        })
    }

    /// Upload file content and return its storage path.
    pub async fn upload_file(
        &self,
        user_id: Uuid,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> AppResult<String> {
        let storage_path = Self::storage_path(user_id, filename);

        self.bucket
            .put_object_with_content_type(&storage_path, bytes, content_type)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload file to storage: {}", e)))?;

        Ok(storage_path)
    }

    /// Presigned GET URL for a stored object.
    pub async fn file_url(&self, storage_path: &str) -> AppResult<String> {
        self.bucket
            .presign_get(storage_path, self.presign_expiry_secs, None)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to generate file URL: {}", e)))
    }

    pub async fn delete_file(&self, storage_path: &str) -> AppResult<()> {
        self.bucket
            .delete_object(storage_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete file from storage: {}", e)))?;

        Ok(())
    }

    fn storage_path(user_id: Uuid, filename: &str) -> String {
        format!("{}/{}/{}", user_id, Uuid::new_v4(), filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructs_against_custom_endpoint() {
        let config = StorageConfig {
            bucket: "files".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio-secret".to_string()),
            endpoint: Some("http://localhost:9000".to_string()),
            presign_expiry_secs: 3600,
        };

        let storage = ObjectStorage::new(&config).unwrap();
        assert_eq!(storage.presign_expiry_secs, 3600);
    }

    #[test]
    fn test_storage_path_scopes_by_user_and_is_unique() {
        let user = Uuid::new_v4();
        let first = ObjectStorage::storage_path(user, "report.csv");
        let second = ObjectStorage::storage_path(user, "report.csv");

        assert!(first.starts_with(&user.to_string()));
        assert!(first.ends_with("/report.csv"));
        assert_ne!(first, second);
    }
}
