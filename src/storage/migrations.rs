//! Schema migration helpers.
//!
//! Applies the named statements from [`super::schema`] exactly once each,
//! tracked in a `_migrations` table. Running the runner repeatedly is safe:
//! already-applied statements are skipped, and the statements themselves use
//! `IF NOT EXISTS`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use super::schema;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A schema statement failed to execute.
    #[error("Migration '{name}' failed: {message}")]
    StatementFailed { name: String, message: String },
}

/// A migration recorded as applied.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Migration runner for applying schema changes.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    /// Creates a new migration runner on the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies all pending schema statements.
    pub async fn run_migrations(&self) -> Result<(), MigrationError> {
        self.ensure_migrations_table().await?;

        for (name, statement) in schema::all_schema_statements() {
            if self.is_applied(name).await? {
                continue;
            }
            self.apply(name, statement).await?;
            info!(migration = name, "applied schema migration");
        }

        Ok(())
    }

    /// Lists migrations that have been applied, oldest first.
    pub async fn applied_migrations(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.ensure_migrations_table().await?;

        let rows: Vec<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT name, applied_at FROM _migrations ORDER BY applied_at, id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(name, applied_at)| AppliedMigration { name, applied_at })
            .collect())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_applied(&self, name: &str) -> Result<bool, MigrationError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn apply(&self, name: &str, statement: &str) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;

        sqlx::raw_sql(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::StatementFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
