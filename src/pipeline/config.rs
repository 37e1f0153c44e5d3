//! Pipeline configuration.
//!
//! All runtime settings in one struct, constructed once at process start
//! (from the environment, `.env` honored) and passed by reference into each
//! stage. Nothing else in the crate reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::enrich::DEFAULT_BATCH_SIZE;
use crate::llm::DEFAULT_MODEL;

/// Errors that can occur while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("{0} is not set (check your .env file)")]
    MissingEnvVar(&'static str),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Contact email sent to NCBI with every E-utilities request when
/// `PUBMED_EMAIL` is not set.
pub const DEFAULT_CONTACT_EMAIL: &str = "example@example.com";

/// Configuration for the pipeline and its stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Bearer credential for the generative-text service. Only the
    /// enrichment stage needs it; the other stages run without one.
    pub openai_api_key: Option<String>,
    /// Default search query (`PUBMED_QUERY`), overridable per invocation.
    pub query: Option<String>,
    /// Contact email for the E-utilities caller-identification pair.
    pub contact_email: String,
    /// Maximum number of PMIDs requested from esearch.
    pub max_results: usize,
    /// Candidates processed per enrichment run.
    pub enrich_batch_size: i64,
    /// Generation model.
    pub model: String,
    /// Availability-gate polling timeout.
    pub db_wait_timeout: Duration,
    /// Availability-gate polling interval.
    pub db_wait_interval: Duration,
    /// Intermediate search+summary results file.
    pub results_path: PathBuf,
    /// Directory the exporter writes CSVs into.
    pub export_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            openai_api_key: None,
            query: None,
            contact_email: DEFAULT_CONTACT_EMAIL.to_string(),
            max_results: 20,
            enrich_batch_size: DEFAULT_BATCH_SIZE,
            model: DEFAULT_MODEL.to_string(),
            db_wait_timeout: Duration::from_secs(40),
            db_wait_interval: Duration::from_millis(1500),
            results_path: PathBuf::from("data/pubmed_results.json"),
            export_dir: PathBuf::from("exports"),
        }
    }
}

impl PipelineConfig {
    /// Builds the configuration from the process environment.
    ///
    /// Loads `.env` first if present. `DATABASE_URL` is required; everything
    /// else falls back to defaults. The OpenAI key is validated lazily by
    /// [`require_openai_key`](Self::require_openai_key) so that stages which
    /// never call the generative-text service run without one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            query: std::env::var("PUBMED_QUERY").ok(),
            contact_email: std::env::var("PUBMED_EMAIL")
                .unwrap_or_else(|_| DEFAULT_CONTACT_EMAIL.to_string()),
            ..Self::default()
        })
    }

    /// Returns the OpenAI key, failing before any network call if absent.
    pub fn require_openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingEnvVar("OPENAI_API_KEY"))
    }

    /// Resolves the query to use: explicit argument, then `PUBMED_QUERY`.
    pub fn resolve_query(&self, explicit: Option<&str>) -> Result<String, ConfigError> {
        explicit
            .map(str::to_string)
            .or_else(|| self.query.clone())
            .filter(|q| !q.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("PUBMED_QUERY"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_results, 20);
        assert_eq!(config.enrich_batch_size, 20);
        assert_eq!(config.db_wait_timeout, Duration::from_secs(40));
        assert_eq!(config.results_path, PathBuf::from("data/pubmed_results.json"));
    }

    #[test]
    fn test_require_openai_key_absent() {
        let config = PipelineConfig::default();
        assert!(matches!(
            config.require_openai_key(),
            Err(ConfigError::MissingEnvVar("OPENAI_API_KEY"))
        ));
    }

    #[test]
    fn test_require_openai_key_empty_is_absent() {
        let config = PipelineConfig {
            openai_api_key: Some(String::new()),
            ..PipelineConfig::default()
        };
        assert!(config.require_openai_key().is_err());
    }

    #[test]
    fn test_resolve_query_prefers_explicit() {
        let config = PipelineConfig {
            query: Some("from env".to_string()),
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.resolve_query(Some("explicit")).unwrap(),
            "explicit"
        );
        assert_eq!(config.resolve_query(None).unwrap(), "from env");
    }

    #[test]
    fn test_resolve_query_missing() {
        let config = PipelineConfig::default();
        assert!(matches!(
            config.resolve_query(None),
            Err(ConfigError::MissingEnvVar("PUBMED_QUERY"))
        ));
    }
}
