//! Job queries.

use uuid::Uuid;

use crate::db::models::JobRow;
use crate::db::DbPool;
use crate::error::WorkerResult;

/// Get a job by id.
pub async fn get_job(pool: &DbPool, job_id: Uuid) -> WorkerResult<Option<JobRow>> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, project_id, status, error, started_at, completed_at
        FROM ymm.job
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Mark a job RUNNING and stamp its start time.
pub async fn mark_running(pool: &DbPool, job_id: Uuid) -> WorkerResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ymm.job
        SET status = 'RUNNING', error = NULL, started_at = NOW(), completed_at = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Move a job to a final status.
pub async fn mark_finished(
    pool: &DbPool,
    job_id: Uuid,
    status: &str,
    error: Option<&str>,
) -> WorkerResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ymm.job
        SET status = $2, error = $3, completed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(status)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Set a non-final status without touching timestamps.
pub async fn set_status(
    pool: &DbPool,
    job_id: Uuid,
    status: &str,
    error: Option<&str>,
) -> WorkerResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ymm.job
        SET status = $2, error = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(status)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
