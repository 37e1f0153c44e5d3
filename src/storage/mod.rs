//! PostgreSQL persistent storage.
//!
//! Two persisted tables (`pubmed_articles`, `article_enrichment`) plus the
//! declaratively defined export views. Schema creation goes through an
//! idempotent migration runner; views are re-applied wholesale on demand.

pub mod database;
pub mod migrations;
pub mod schema;

pub use database::{ArticlePreview, Candidate, Database, DatabaseError, EnrichmentPreview};
pub use migrations::{AppliedMigration, MigrationError, MigrationRunner};
