//! Project file queries.

use sqlx::{Postgres, QueryBuilder};

use ymm_core::ProjectFile;

use crate::db::DbPool;
use crate::error::WorkerResult;

/// Insert project file rows in one statement.
pub async fn insert_files(pool: &DbPool, files: &[ProjectFile]) -> WorkerResult<u64> {
    if files.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO ymm.project_file \
         (job_id, step_name, file_type, file_category, relative_path, file_size_bytes, created_at) ",
    );
    builder.push_values(files, |mut row, file| {
        row.push_bind(file.job_id)
            .push_bind(file.step_name.map(|s| s.as_str()))
            .push_bind(file.file_type.as_str())
            .push_bind(file.file_category.as_str())
            .push_bind(&file.relative_path)
            .push_bind(file.file_size_bytes.map(|b| b as i64))
            .push("NOW()");
    });

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}
