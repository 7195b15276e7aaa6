use crate::error::DbError;
use crate::models::{CreateErrorRecord, ErrorRecord, ErrorRecordRow, ErrorResolution};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ErrorRecordRepository {
    pool: SqlitePool,
}

impl ErrorRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, record: &CreateErrorRecord) -> Result<Uuid, DbError> {
        let id = Uuid::new_v4();
        let classification_json = serde_json::to_string(&record.classification)?;
        let context_json =
            serde_json::to_string(&record.context).unwrap_or_else(|_| "null".to_string());

        sqlx::query(
            r#"
            INSERT INTO error_records (id, session_id, step_id, agent_type, message, severity, category, classification, context, retry_count, resolution, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(record.session_id.to_string())
        .bind(&record.step_id)
        .bind(record.agent_type.as_str())
        .bind(&record.message)
        .bind(record.classification.severity.as_str())
        .bind(record.classification.category.as_str())
        .bind(&classification_json)
        .bind(&context_json)
        .bind(i64::from(record.retry_count))
        .bind(record.resolution.as_str())
        .bind(CreateErrorRecord::created_at())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn find_by_session_id(&self, session_id: Uuid) -> Result<Vec<ErrorRecord>, DbError> {
        let rows: Vec<ErrorRecordRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, step_id, agent_type, message, severity, category, classification, context, retry_count, resolution, created_at
            FROM error_records
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn count_unresolved(&self, session_id: Uuid) -> Result<i64, DbError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM error_records WHERE session_id = ? AND resolution = 'unresolved'",
        )
        .bind(session_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    pub async fn update_resolution(
        &self,
        id: Uuid,
        resolution: ErrorResolution,
    ) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE error_records SET resolution = ? WHERE id = ?")
            .bind(resolution.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ErrorRecordNotFound(id));
        }
        Ok(())
    }

    /// Mark every unresolved failure of one step as resolved, used when a
    /// manual re-submission succeeds.
    pub async fn resolve_step(&self, session_id: Uuid, step_id: &str) -> Result<u64, DbError> {
        let result = sqlx::query(
            "UPDATE error_records SET resolution = 'resolved' WHERE session_id = ? AND step_id = ? AND resolution != 'resolved'",
        )
        .bind(session_id.to_string())
        .bind(step_id)
        .execute(&self.pool)
        .await?;

        let resolved = result.rows_affected();
        tracing::debug!(session_id = %session_id, step_id, resolved, "Resolved error records");
        Ok(resolved)
    }
}
