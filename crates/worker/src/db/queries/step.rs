//! Workflow step queries.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::models::WorkflowStepRow;
use crate::db::DbPool;
use crate::error::WorkerResult;

/// Get the row for a (job, step) pair.
pub async fn get_step(
    pool: &DbPool,
    job_id: Uuid,
    step_name: &str,
) -> WorkerResult<Option<WorkflowStepRow>> {
    let row = sqlx::query_as::<_, WorkflowStepRow>(
        r#"
        SELECT job_id, step_name, status, started_at, completed_at, output_json, error
        FROM ymm.workflow_step
        WHERE job_id = $1 AND step_name = $2
        "#,
    )
    .bind(job_id)
    .bind(step_name)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lock the row for a (job, step) pair inside a transaction.
pub async fn get_step_for_update(
    conn: &mut PgConnection,
    job_id: Uuid,
    step_name: &str,
) -> WorkerResult<Option<WorkflowStepRow>> {
    let row = sqlx::query_as::<_, WorkflowStepRow>(
        r#"
        SELECT job_id, step_name, status, started_at, completed_at, output_json, error
        FROM ymm.workflow_step
        WHERE job_id = $1 AND step_name = $2
        FOR UPDATE
        "#,
    )
    .bind(job_id)
    .bind(step_name)
    .fetch_optional(conn)
    .await?;

    Ok(row)
}

/// All step rows of a job.
pub async fn list_steps(pool: &DbPool, job_id: Uuid) -> WorkerResult<Vec<WorkflowStepRow>> {
    let rows = sqlx::query_as::<_, WorkflowStepRow>(
        r#"
        SELECT job_id, step_name, status, started_at, completed_at, output_json, error
        FROM ymm.workflow_step
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Write every column of a step row, inserting it if missing.
pub async fn upsert_step(conn: &mut PgConnection, row: &WorkflowStepRow) -> WorkerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ymm.workflow_step (
            job_id, step_name, status, started_at, completed_at, output_json, error,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
        ON CONFLICT (job_id, step_name) DO UPDATE SET
            status = EXCLUDED.status,
            started_at = EXCLUDED.started_at,
            completed_at = EXCLUDED.completed_at,
            output_json = EXCLUDED.output_json,
            error = EXCLUDED.error,
            updated_at = NOW()
        "#,
    )
    .bind(row.job_id)
    .bind(&row.step_name)
    .bind(&row.status)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(row.output_json.as_ref())
    .bind(row.error.as_deref())
    .execute(conn)
    .await?;

    Ok(())
}

/// Insert PENDING rows for steps that have none.
pub async fn ensure_steps(pool: &DbPool, job_id: Uuid, step_names: &[String]) -> WorkerResult<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO ymm.workflow_step (job_id, step_name, status, created_at, updated_at)
        SELECT $1, name, 'PENDING', NOW(), NOW()
        FROM UNNEST($2::text[]) AS name
        ON CONFLICT (job_id, step_name) DO NOTHING
        "#,
    )
    .bind(job_id)
    .bind(step_names)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
