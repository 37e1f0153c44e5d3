//! pubmed-pipeline: PubMed literature ingestion and AI enrichment.
//!
//! This library queries the PubMed database for articles matching a research
//! topic, stores bibliographic metadata in Postgres, enriches each article
//! with an AI-generated summary/classification, and exports read-optimized
//! views as CSV for a BI tool.

pub mod cli;
pub mod enrich;
pub mod error;
pub mod export;
pub mod llm;
pub mod pipeline;
pub mod pubmed;
pub mod storage;

// Re-export commonly used error types
pub use error::{ExportError, LlmError, PubMedError};
