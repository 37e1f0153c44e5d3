//! Pipeline orchestrator.
//!
//! Runs the stages strictly in sequence: availability gate → optional reset
//! → search+summaries (written to the intermediate JSON file) → load →
//! enrich → view materialization → CSV export. Each stage either completes
//! or fails the whole run; there is no retry or resumption across stage
//! boundaries.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::enrich::{EnrichError, EnrichmentEngine, EnrichmentStats};
use crate::error::{ExportError, PubMedError};
use crate::export::{export_views, ExportedFile};
use crate::llm::OpenAiClient;
use crate::pubmed::{ArticleSummary, PubMedClient};
use crate::storage::{Database, DatabaseError};

use super::config::{ConfigError, PipelineConfig};

/// Errors that can occur during a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database error (including the availability-gate timeout).
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// PubMed protocol or transport error.
    #[error("PubMed error: {0}")]
    PubMed(#[from] PubMedError),

    /// Enrichment run failed as a whole.
    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),

    /// Export failed.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Reading or writing the intermediate results file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The intermediate results file did not round-trip as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The loader was invoked before any fetch produced results.
    #[error("{0} not found. Run the fetch stage first.")]
    MissingResultsFile(PathBuf),
}

/// Summary of one full pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub articles_fetched: usize,
    pub articles_loaded: u64,
    pub enrichment: EnrichmentStats,
    pub exports: Vec<ExportedFile>,
}

/// Coordinates the pipeline stages over one configuration.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over `config`.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs the full pipeline for `query`.
    ///
    /// With `overwrite`, all stored rows are discarded after the
    /// availability gate and before fetching.
    pub async fn run(&self, query: &str, overwrite: bool) -> Result<PipelineReport, PipelineError> {
        // Fail on missing credentials before any network or storage call.
        let api_key = self.config.require_openai_key()?.to_string();

        let db = self.wait_for_store().await?;
        db.run_migrations().await?;

        if overwrite {
            info!("overwrite requested; clearing stored rows");
            db.reset().await?;
        }

        let pubmed = PubMedClient::new(&self.config.contact_email);

        let articles = self.fetch_stage(&pubmed, query).await?;
        let articles_fetched = articles.len();

        let articles_loaded = self.load_stage(&db).await?;

        let llm = OpenAiClient::new(api_key);
        let engine = EnrichmentEngine::new(&self.config.model, self.config.enrich_batch_size);
        let enrichment = engine.run(&db, &pubmed, &llm).await?;

        db.apply_views().await?;
        let exports = export_views(&db, &self.config.export_dir).await?;

        info!(
            loaded = articles_loaded,
            enriched = enrichment.enriched,
            exports = exports.len(),
            "pipeline run complete"
        );

        Ok(PipelineReport {
            articles_fetched,
            articles_loaded,
            enrichment,
            exports,
        })
    }

    /// Availability gate: polls the store until ready or timeout.
    pub async fn wait_for_store(&self) -> Result<Database, PipelineError> {
        Ok(Database::wait_until_ready(
            &self.config.database_url,
            self.config.db_wait_timeout,
            self.config.db_wait_interval,
        )
        .await?)
    }

    /// Search + summary stage: esearch, esummary, then write the results to
    /// the intermediate JSON file the loader consumes.
    pub async fn fetch_stage(
        &self,
        pubmed: &PubMedClient,
        query: &str,
    ) -> Result<Vec<ArticleSummary>, PipelineError> {
        info!(query, "searching PubMed");
        let pmids = pubmed.esearch(query, self.config.max_results).await?;
        info!(count = pmids.len(), "found PMIDs");

        let articles = pubmed.esummary(&pmids).await?;
        info!(count = articles.len(), "fetched article summaries");

        if let Some(parent) = self.config.results_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(
            &self.config.results_path,
            serde_json::to_string_pretty(&articles)?,
        )?;
        info!(path = %self.config.results_path.display(), "saved results");

        for article in articles.iter().take(3) {
            debug!(
                pmid = %article.pmid,
                title = article.title.as_deref().unwrap_or(""),
                journal = article.journal.as_deref().unwrap_or(""),
                pubdate = article.pubdate.as_deref().unwrap_or(""),
                "preview"
            );
        }

        Ok(articles)
    }

    /// Loader stage: read the intermediate JSON file and upsert every record
    /// in one transaction.
    pub async fn load_stage(&self, db: &Database) -> Result<u64, PipelineError> {
        let path = &self.config.results_path;
        if !path.exists() {
            return Err(PipelineError::MissingResultsFile(path.clone()));
        }

        let articles: Vec<ArticleSummary> = serde_json::from_str(&fs::read_to_string(path)?)?;
        info!(count = articles.len(), "loaded articles from JSON");

        let loaded = db.upsert_articles(&articles).await?;
        info!(count = loaded, "inserted/updated articles");
        Ok(loaded)
    }
}
