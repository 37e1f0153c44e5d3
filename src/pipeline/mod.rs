//! Pipeline orchestration.
//!
//! The pipeline is a fixed sequence of single-purpose stages over two
//! external services and one Postgres store:
//!
//! 1. **Availability gate** — poll the store until it accepts connections
//! 2. **Search** — esearch for a free-text query, bounded PMID list
//! 3. **Summaries** — bulk bibliographic metadata, saved to a JSON file
//! 4. **Load** — upsert article rows from the JSON file
//! 5. **Enrich** — generate summary/keywords/category/score per article
//! 6. **Views** — (re)define the read-optimized export views
//! 7. **Export** — serialize every view to CSV
//!
//! Control flow is strictly linear and stateless between runs except for
//! what is persisted in the store. Every stage is also independently
//! invocable from the CLI, and reruns upsert rather than duplicate.

pub mod config;
pub mod orchestrator;

pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{PipelineError, PipelineOrchestrator, PipelineReport};
