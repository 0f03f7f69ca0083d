use sqlx::PgPool;
use crate::models::*;
use anyhow::Result;
use uuid::Uuid;

// Runtime-checked queries (query_as without compile-time DATABASE_URL)

pub struct DatabaseOperations;

impl DatabaseOperations {
    // File operations
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_file(
        pool: &PgPool,
        user_id: Uuid,
        project_id: Option<Uuid>,
        filename: &str,
        file_type: &str,
        file_size: i64,
        storage_path: &str,
        status: &str,
    ) -> Result<FileRecord> {
        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO files (user_id, project_id, filename, file_type, file_size, storage_path, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(project_id)
        .bind(filename)
        .bind(file_type)
        .bind(file_size)
        .bind(storage_path)
        .bind(status)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn get_file(pool: &PgPool, file_id: Uuid) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = $1")
            .bind(file_id)
            .fetch_optional(pool)
            .await?;

        Ok(record)
    }

    pub async fn list_files(pool: &PgPool, project_id: Option<Uuid>) -> Result<Vec<FileRecord>> {
        let records = match project_id {
            Some(project) => {
                sqlx::query_as::<_, FileRecord>(
                    "SELECT * FROM files WHERE project_id = $1 ORDER BY created_at DESC",
                )
                .bind(project)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, FileRecord>("SELECT * FROM files ORDER BY created_at DESC")
                    .fetch_all(pool)
                    .await?
            }
        };

        Ok(records)
    }

    pub async fn mark_file_completed(
        pool: &PgPool,
        file_id: Uuid,
        ai_summary: &str,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET status = 'completed', ai_summary = $1, metadata = $2
            WHERE id = $3
            "#,
        )
        .bind(ai_summary)
        .bind(metadata)
        .bind(file_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn mark_file_failed(pool: &PgPool, file_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET status = 'failed', metadata = jsonb_build_object('error', $1::text)
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(file_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    // Processed data operations
    pub async fn insert_processed_data(
        pool: &PgPool,
        file_id: Uuid,
        cleaned_data: &serde_json::Value,
        data_schema: &serde_json::Value,
    ) -> Result<ProcessedDataRecord> {
        let record = sqlx::query_as::<_, ProcessedDataRecord>(
            r#"
            INSERT INTO processed_data (file_id, cleaned_data, data_schema)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(file_id)
        .bind(cleaned_data)
        .bind(data_schema)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn get_processed_data(
        pool: &PgPool,
        file_id: Uuid,
    ) -> Result<Option<ProcessedDataRecord>> {
        let record = sqlx::query_as::<_, ProcessedDataRecord>(
            "SELECT * FROM processed_data WHERE file_id = $1",
        )
        .bind(file_id)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    // Analysis result operations
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_analysis_result(
        pool: &PgPool,
        file_id: Uuid,
        analysis_type: &str,
        insights: &serde_json::Value,
        chart_config: Option<&serde_json::Value>,
        anomalies: Option<&serde_json::Value>,
        key_metrics: Option<&serde_json::Value>,
        recommendations: Option<&serde_json::Value>,
        metadata: &serde_json::Value,
    ) -> Result<AnalysisResultRecord> {
        let record = sqlx::query_as::<_, AnalysisResultRecord>(
            r#"
            INSERT INTO analysis_results
                (file_id, analysis_type, insights, chart_config, anomalies, key_metrics, recommendations, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(file_id)
        .bind(analysis_type)
        .bind(insights)
        .bind(chart_config)
        .bind(anomalies)
        .bind(key_metrics)
        .bind(recommendations)
        .bind(metadata)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn list_analysis_results(
        pool: &PgPool,
        file_id: Uuid,
    ) -> Result<Vec<AnalysisResultRecord>> {
        let records = sqlx::query_as::<_, AnalysisResultRecord>(
            "SELECT * FROM analysis_results WHERE file_id = $1 ORDER BY created_at DESC",
        )
        .bind(file_id)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    // Project operations
    pub async fn create_project(
        pool: &PgPool,
        name: &str,
        description: Option<&str>,
    ) -> Result<ProjectRecord> {
        let record = sqlx::query_as::<_, ProjectRecord>(
            r#"
            INSERT INTO projects (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, 0::bigint AS file_count, created_at
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn list_projects(pool: &PgPool) -> Result<Vec<ProjectRecord>> {
        let records = sqlx::query_as::<_, ProjectRecord>(
            r#"
            SELECT p.id, p.name, p.description,
                   COUNT(f.id) AS file_count,
                   p.created_at
            FROM projects p
            LEFT JOIN files f ON f.project_id = p.id
            GROUP BY p.id
            ORDER BY p.created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(records)
    }
}
