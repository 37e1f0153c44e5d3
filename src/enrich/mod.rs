//! Enrichment engine.
//!
//! For a bounded batch of articles with no enrichment row yet: fetch their
//! abstracts in bulk, send title+abstract to the generative-text service
//! with the fixed prompt, parse the JSON reply, and upsert the result keyed
//! by PMID. All reads and writes of one invocation share one transaction;
//! per-candidate failures (no abstract, blank or malformed model output) are
//! caught before any write for that candidate, so they skip the candidate
//! without poisoning the batch.

pub mod response;

use std::collections::HashMap;

use sqlx::PgConnection;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{LlmError, PubMedError};
use crate::llm::LlmProvider;
use crate::pubmed::PubMedClient;
use crate::storage::{Candidate, Database, DatabaseError};

pub use response::{parse_enrichment, Enrichment, TopicCategory};

/// Tag stored with every enrichment row so prompt changes are traceable.
pub const PROMPT_VERSION: &str = "v1";

/// Default number of candidates processed per invocation.
pub const DEFAULT_BATCH_SIZE: i64 = 20;

/// Errors that abort a whole enrichment run (as opposed to per-candidate
/// failures, which are logged and skipped).
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Candidate selection or enrichment upsert failed.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Transaction handling failed.
    #[error("Transaction error: {0}")]
    Transaction(#[from] sqlx::Error),

    /// The bulk abstract fetch failed.
    #[error("Abstract fetch error: {0}")]
    PubMed(#[from] PubMedError),
}

/// Outcome of enriching a single candidate.
#[derive(Debug)]
pub enum CandidateOutcome {
    /// The model produced a usable enrichment.
    Enriched(Enrichment),
    /// The fetched abstract was empty; no generation call was made.
    SkippedNoAbstract,
    /// The generation call or its JSON payload was unusable.
    Failed(LlmError),
}

/// Counters for one enrichment run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentStats {
    /// Candidates selected by the anti-join.
    pub selected: usize,
    /// Enrichment rows written.
    pub enriched: usize,
    /// Candidates skipped for lack of an abstract.
    pub skipped_no_abstract: usize,
    /// Candidates whose generation call or payload failed.
    pub failed: usize,
}

/// Builds the fixed enrichment prompt around one title and abstract.
pub fn build_prompt(title: &str, abstract_text: &str) -> String {
    let categories = TopicCategory::ALL
        .iter()
        .map(|c| format!("\"{}\"", c.as_str()))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "You are helping analyze scientific papers for a literature review.\n\
         \n\
         Return ONLY JSON. No markdown. No extra text.\n\
         \n\
         Return a JSON object with these keys:\n\
         - summary: string (2-3 sentences)\n\
         - keywords: array of 5-10 short strings\n\
         - topic_category: one of [{categories}]\n\
         - relevance_score: integer 0-100 (how relevant to salt crystallization in porous masonry)\n\
         \n\
         Title: {title}\n\
         \n\
         Abstract:\n{abstract_text}"
    )
}

/// Produces the enrichment for one candidate, without touching storage.
///
/// An empty abstract short-circuits before any generation call. A blank
/// model reply maps to [`LlmError::EmptyResponse`]; a reply that is not JSON
/// maps to [`LlmError::MalformedResponse`].
pub async fn enrich_candidate(
    llm: &dyn LlmProvider,
    model: &str,
    title: &str,
    abstract_text: &str,
) -> CandidateOutcome {
    if abstract_text.trim().is_empty() {
        return CandidateOutcome::SkippedNoAbstract;
    }

    let prompt = build_prompt(title, abstract_text);
    let raw = match llm.generate_json(model, &prompt).await {
        Ok(raw) => raw,
        Err(e) => return CandidateOutcome::Failed(e),
    };

    if raw.trim().is_empty() {
        return CandidateOutcome::Failed(LlmError::EmptyResponse);
    }

    match parse_enrichment(&raw) {
        Ok(enrichment) => CandidateOutcome::Enriched(enrichment),
        Err(e) => CandidateOutcome::Failed(e),
    }
}

/// Runs enrichment batches against the store.
pub struct EnrichmentEngine {
    model: String,
    batch_size: i64,
}

impl EnrichmentEngine {
    /// Creates an engine generating with `model`, processing up to
    /// `batch_size` candidates per run.
    pub fn new(model: impl Into<String>, batch_size: i64) -> Self {
        Self {
            model: model.into(),
            batch_size,
        }
    }

    /// Runs one enrichment batch: select → bulk-fetch abstracts → per-candidate
    /// generate+upsert, all inside one transaction.
    ///
    /// With no candidates the run returns immediately: no network call, no
    /// write.
    pub async fn run(
        &self,
        db: &Database,
        pubmed: &PubMedClient,
        llm: &dyn LlmProvider,
    ) -> Result<EnrichmentStats, EnrichError> {
        let mut tx = db.begin().await?;

        let candidates = Database::select_unenriched(&mut *tx, self.batch_size).await?;
        if candidates.is_empty() {
            info!("no new articles to enrich");
            return Ok(EnrichmentStats::default());
        }

        let pmids: Vec<i64> = candidates.iter().map(|c| c.pmid).collect();
        let abstracts = pubmed.fetch_abstracts(&pmids).await?;

        let stats = self
            .process_candidates(&mut *tx, llm, &candidates, &abstracts)
            .await?;

        tx.commit().await?;

        info!(
            selected = stats.selected,
            enriched = stats.enriched,
            skipped = stats.skipped_no_abstract,
            failed = stats.failed,
            "enrichment batch complete"
        );
        Ok(stats)
    }

    /// Per-candidate loop over pre-fetched abstracts.
    ///
    /// Separated from [`run`](Self::run) so callers (and tests) can supply
    /// the abstract map themselves.
    pub async fn process_candidates(
        &self,
        conn: &mut PgConnection,
        llm: &dyn LlmProvider,
        candidates: &[Candidate],
        abstracts: &HashMap<i64, String>,
    ) -> Result<EnrichmentStats, EnrichError> {
        let mut stats = EnrichmentStats {
            selected: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            let abstract_text = abstracts
                .get(&candidate.pmid)
                .map(String::as_str)
                .unwrap_or("");

            match enrich_candidate(llm, &self.model, &candidate.title, abstract_text).await {
                CandidateOutcome::SkippedNoAbstract => {
                    warn!(pmid = candidate.pmid, "no abstract found; skipping");
                    stats.skipped_no_abstract += 1;
                }
                CandidateOutcome::Failed(e) => {
                    warn!(pmid = candidate.pmid, error = %e, "enrichment failed; skipping");
                    stats.failed += 1;
                }
                CandidateOutcome::Enriched(enrichment) => {
                    Database::upsert_enrichment(
                        conn,
                        candidate.pmid,
                        &enrichment,
                        &self.model,
                        PROMPT_VERSION,
                    )
                    .await?;
                    info!(
                        pmid = candidate.pmid,
                        category = %enrichment.topic_category,
                        score = enrichment.relevance_score,
                        "enriched article"
                    );
                    stats.enriched += 1;
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Scripted provider returning a fixed response and counting calls.
    struct ScriptedProvider {
        response: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn returning(response: &str) -> Self {
            Self {
                response: Ok(response.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate_json(&self, _model: &str, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(LlmError::ApiError {
                    code: 500,
                    message: "scripted failure".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_abstract_skips_without_generation_call() {
        let provider = ScriptedProvider::returning("{}");

        let outcome = enrich_candidate(&provider, "gpt-4o-mini", "A title", "   ").await;

        assert!(matches!(outcome, CandidateOutcome::SkippedNoAbstract));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_response_is_empty_response_error() {
        let provider = ScriptedProvider::returning("   ");

        let outcome =
            enrich_candidate(&provider, "gpt-4o-mini", "A title", "Some abstract.").await;

        assert!(matches!(
            outcome,
            CandidateOutcome::Failed(LlmError::EmptyResponse)
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_is_isolated_failure() {
        let provider = ScriptedProvider::returning("the model rambled instead of JSON");

        let outcome =
            enrich_candidate(&provider, "gpt-4o-mini", "A title", "Some abstract.").await;

        assert!(matches!(
            outcome,
            CandidateOutcome::Failed(LlmError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_api_failure_is_isolated_failure() {
        let provider = ScriptedProvider::failing();

        let outcome =
            enrich_candidate(&provider, "gpt-4o-mini", "A title", "Some abstract.").await;

        assert!(matches!(
            outcome,
            CandidateOutcome::Failed(LlmError::ApiError { code: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_successful_candidate_parses_fields() {
        let provider = ScriptedProvider::returning(
            r#"{"summary": "s", "keywords": ["k1", "k2"], "topic_category": "masonry materials", "relevance_score": 64}"#,
        );

        let outcome =
            enrich_candidate(&provider, "gpt-4o-mini", "A title", "Some abstract.").await;

        match outcome {
            CandidateOutcome::Enriched(e) => {
                assert_eq!(e.summary, "s");
                assert_eq!(e.keywords, vec!["k1", "k2"]);
                assert_eq!(e.topic_category, TopicCategory::MasonryMaterials);
                assert_eq!(e.relevance_score, 64);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_prompt_embeds_title_abstract_and_categories() {
        let prompt = build_prompt("Salt damage", "Background: text");

        assert!(prompt.contains("Title: Salt damage"));
        assert!(prompt.contains("Abstract:\nBackground: text"));
        for category in TopicCategory::ALL {
            assert!(
                prompt.contains(category.as_str()),
                "prompt should offer {category}"
            );
        }
        assert!(prompt.contains("Return ONLY JSON"));
    }
}
