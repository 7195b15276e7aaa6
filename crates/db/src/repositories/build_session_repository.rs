use crate::error::DbError;
use crate::models::{BuildSession, BuildSessionRow, BuildSessionStatus};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct BuildSessionRepository {
    pool: SqlitePool,
}

impl BuildSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &BuildSession) -> Result<BuildSession, DbError> {
        let row = BuildSessionRow::from(session);

        sqlx::query(
            r#"
            INSERT INTO build_sessions (id, user_id, project_id, request_type, description, status, total_steps, completed_steps, fallback, error, created_at, updated_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.project_id)
        .bind(&row.request_type)
        .bind(&row.description)
        .bind(&row.status)
        .bind(row.total_steps)
        .bind(row.completed_steps)
        .bind(row.fallback)
        .bind(&row.error)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(session.clone())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<BuildSession>, DbError> {
        let row: Option<BuildSessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, project_id, request_type, description, status, total_steps, completed_steps, fallback, error, created_at, updated_at, finished_at
            FROM build_sessions
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn find_by_project_id(&self, project_id: &str) -> Result<Vec<BuildSession>, DbError> {
        let rows: Vec<BuildSessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, project_id, request_type, description, status, total_steps, completed_steps, fallback, error, created_at, updated_at, finished_at
            FROM build_sessions
            WHERE project_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Record the terminal state of a build session.
    pub async fn finish(
        &self,
        id: Uuid,
        status: BuildSessionStatus,
        completed_steps: usize,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE build_sessions
            SET status = ?, completed_steps = ?, error = ?, updated_at = ?, finished_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(completed_steps as i64)
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::BuildSessionNotFound(id));
        }
        Ok(())
    }
}
