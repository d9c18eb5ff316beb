//! Database pool construction and migrations.

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::Result;

/// Build a connection pool against `database_url` and run embedded
/// migrations, matching the teacher's pattern of provisioning storage
/// idempotently on startup rather than requiring a separate migrate step.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        crate::error::AppError::Internal(format!("migration failed: {e}"))
    })?;

    Ok(pool)
}
