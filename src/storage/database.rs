//! PostgreSQL client for the article store.
//!
//! Wraps a single-connection pool (the pipeline is strictly sequential, one
//! stage at a time) and exposes the handful of statements the stages need:
//! article upserts, the enrichment anti-join, enrichment upserts, counts and
//! previews for `status`, and the full reset.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::info;

use crate::enrich::response::Enrichment;
use crate::pubmed::ArticleSummary;

use super::migrations::MigrationRunner;
use super::schema;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] super::migrations::MigrationError),

    /// Serialization of a JSONB column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An article record carried a PMID that is not numeric.
    #[error("invalid PMID '{0}': not a number")]
    InvalidPmid(String),

    /// The store did not accept connections within the polling timeout.
    #[error("Postgres did not become ready within {timeout_secs} seconds. Last error: {last_error}")]
    Unavailable {
        timeout_secs: u64,
        last_error: String,
    },
}

/// An article awaiting enrichment, as selected by the anti-join.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pmid: i64,
    pub title: String,
}

/// Row preview for the `status` command (articles side).
#[derive(Debug)]
pub struct ArticlePreview {
    pub pmid: i64,
    pub pubdate: Option<String>,
    pub title: Option<String>,
}

/// Row preview for the `status` command (enrichment side).
#[derive(Debug)]
pub struct EnrichmentPreview {
    pub pmid: i64,
    pub topic_category: String,
    pub relevance_score: i32,
    pub summary: String,
    pub processed_at: DateTime<Utc>,
}

/// PostgreSQL database client.
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connects to the database.
    ///
    /// The pool is capped at one connection: every pipeline invocation is
    /// sequential and single-writer.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Polls the store until it accepts connections or `timeout` elapses.
    ///
    /// A connection that cannot answer `SELECT 1` does not count as ready.
    /// On timeout the last observed error is attached to the failure.
    pub async fn wait_until_ready(
        database_url: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Self, DatabaseError> {
        info!(
            timeout_secs = timeout.as_secs(),
            "waiting for Postgres to be ready"
        );

        let start = Instant::now();
        let mut last_error = String::from("no connection attempt completed");

        while start.elapsed() < timeout {
            match Self::connect(database_url).await {
                Ok(db) => match sqlx::query("SELECT 1").execute(&db.pool).await {
                    Ok(_) => {
                        info!("Postgres is ready");
                        return Ok(db);
                    }
                    Err(e) => last_error = e.to_string(),
                },
                Err(e) => last_error = e.to_string(),
            }
            tokio::time::sleep(interval).await;
        }

        Err(DatabaseError::Unavailable {
            timeout_secs: timeout.as_secs(),
            last_error,
        })
    }

    /// Creates a new database client from an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begins a transaction.
    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    /// Applies any pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let runner = MigrationRunner::new(self.pool.clone());
        runner.run_migrations().await?;
        Ok(())
    }

    /// (Re)defines the read-optimized export views.
    pub async fn apply_views(&self) -> Result<(), DatabaseError> {
        for statement in schema::all_view_statements() {
            sqlx::raw_sql(statement).execute(&self.pool).await?;
        }
        info!("views created/updated");
        Ok(())
    }

    /// Upserts a batch of article summaries keyed by PMID.
    ///
    /// The whole batch shares one transaction: a failure mid-sequence
    /// (including a non-numeric PMID) rolls back everything from this
    /// invocation. On conflict all bibliographic fields are overwritten and
    /// `fetched_at` is refreshed.
    pub async fn upsert_articles(&self, articles: &[ArticleSummary]) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        for article in articles {
            let pmid: i64 = article
                .pmid
                .trim()
                .parse()
                .map_err(|_| DatabaseError::InvalidPmid(article.pmid.clone()))?;
            let authors = serde_json::to_value(&article.authors)?;

            sqlx::query(
                r#"
                INSERT INTO pubmed_articles (pmid, title, journal, pubdate, authors)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (pmid) DO UPDATE SET
                    title = EXCLUDED.title,
                    journal = EXCLUDED.journal,
                    pubdate = EXCLUDED.pubdate,
                    authors = EXCLUDED.authors,
                    fetched_at = NOW()
                "#,
            )
            .bind(pmid)
            .bind(&article.title)
            .bind(&article.journal)
            .bind(&article.pubdate)
            .bind(authors)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(articles.len() as u64)
    }

    /// Selects up to `limit` articles that have no enrichment row yet,
    /// newest PMIDs first.
    pub async fn select_unenriched(
        conn: &mut PgConnection,
        limit: i64,
    ) -> Result<Vec<Candidate>, DatabaseError> {
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT a.pmid, a.title
            FROM pubmed_articles a
            LEFT JOIN article_enrichment e ON e.pmid = a.pmid
            WHERE e.pmid IS NULL
            ORDER BY a.pmid DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(pmid, title)| Candidate {
                pmid,
                title: title.unwrap_or_default(),
            })
            .collect())
    }

    /// Upserts one enrichment keyed by PMID, refreshing `processed_at`.
    pub async fn upsert_enrichment(
        conn: &mut PgConnection,
        pmid: i64,
        enrichment: &Enrichment,
        model_name: &str,
        prompt_version: &str,
    ) -> Result<(), DatabaseError> {
        let keywords = serde_json::to_value(&enrichment.keywords)?;

        sqlx::query(
            r#"
            INSERT INTO article_enrichment
                (pmid, summary, keywords, topic_category, relevance_score, model_name, prompt_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (pmid) DO UPDATE SET
                summary = EXCLUDED.summary,
                keywords = EXCLUDED.keywords,
                topic_category = EXCLUDED.topic_category,
                relevance_score = EXCLUDED.relevance_score,
                model_name = EXCLUDED.model_name,
                prompt_version = EXCLUDED.prompt_version,
                processed_at = NOW()
            "#,
        )
        .bind(pmid)
        .bind(&enrichment.summary)
        .bind(keywords)
        .bind(enrichment.topic_category.as_str())
        .bind(enrichment.relevance_score)
        .bind(model_name)
        .bind(prompt_version)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Number of rows in `pubmed_articles`.
    pub async fn article_count(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pubmed_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of rows in `article_enrichment`.
    pub async fn enrichment_count(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM article_enrichment")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Newest articles, for the `status` preview.
    pub async fn recent_articles(&self, limit: i64) -> Result<Vec<ArticlePreview>, DatabaseError> {
        let rows: Vec<(i64, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT pmid, pubdate, left(title, 80) AS title
            FROM pubmed_articles
            ORDER BY pmid DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(pmid, pubdate, title)| ArticlePreview {
                pmid,
                pubdate,
                title,
            })
            .collect())
    }

    /// Highest-relevance enrichments, for the `status` preview.
    pub async fn top_enrichments(
        &self,
        limit: i64,
    ) -> Result<Vec<EnrichmentPreview>, DatabaseError> {
        let rows: Vec<(i64, String, i32, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT pmid, topic_category, relevance_score, left(summary, 90), processed_at
            FROM article_enrichment
            ORDER BY relevance_score DESC, pmid DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(pmid, topic_category, relevance_score, summary, processed_at)| {
                    EnrichmentPreview {
                        pmid,
                        topic_category,
                        relevance_score,
                        summary,
                        processed_at,
                    }
                },
            )
            .collect())
    }

    /// Irreversibly discards all rows from both tables.
    pub async fn reset(&self) -> Result<(), DatabaseError> {
        sqlx::raw_sql("TRUNCATE article_enrichment, pubmed_articles")
            .execute(&self.pool)
            .await?;
        info!("database cleared");
        Ok(())
    }
}
