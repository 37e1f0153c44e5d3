//! CLI command definitions and handlers.
//!
//! One subcommand per pipeline stage plus the `run` orchestrator. Handlers
//! build a [`PipelineConfig`] from the environment, fold in the command-line
//! overrides, and call into the library. User-facing summaries go to stdout;
//! progress and diagnostics go through `tracing`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::enrich::EnrichmentEngine;
use crate::export::export_views;
use crate::llm::OpenAiClient;
use crate::pipeline::{PipelineConfig, PipelineOrchestrator};
use crate::pubmed::PubMedClient;
use crate::storage::Database;

/// PubMed literature pipeline: search, store, enrich, export.
#[derive(Parser)]
#[command(name = "pubmed-pipeline")]
#[command(about = "Query PubMed, enrich articles with AI summaries, export CSVs for BI dashboards")]
#[command(version)]
#[command(
    long_about = "pubmed-pipeline fetches PubMed articles matching a research topic, stores them \
in Postgres, enriches each with an AI-generated summary/classification, and exports \
materialized views as CSV.\n\nExample usage:\n  pubmed-pipeline run --query '\"gut microbiota\" AND anxiety'"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline: wait-db, fetch, load, enrich, views, export.
    Run(RunArgs),

    /// Wait until Postgres accepts connections.
    WaitDb(WaitDbArgs),

    /// Create/verify the database schema.
    InitDb,

    /// Irreversibly discard all stored rows.
    ResetDb,

    /// Search PubMed and save summaries to the intermediate JSON file.
    Fetch(FetchArgs),

    /// Load the intermediate JSON file into Postgres.
    Load(LoadArgs),

    /// Enrich stored articles with AI summaries.
    Enrich(EnrichArgs),

    /// Create/refresh the export views.
    Views,

    /// Export every view to CSV.
    Export(ExportArgs),

    /// Show row counts and previews of both tables.
    Status,
}

/// Arguments for `pubmed-pipeline run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// PubMed query string.
    #[arg(short, long)]
    pub query: String,

    /// Overwrite old results (reset DB before fetching).
    #[arg(long)]
    pub overwrite: bool,

    /// Maximum number of search results to fetch.
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Enrichment batch size.
    #[arg(long)]
    pub batch_size: Option<i64>,

    /// Output directory for exported CSVs.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `pubmed-pipeline wait-db`.
#[derive(Parser, Debug)]
pub struct WaitDbArgs {
    /// Give up after this many seconds.
    #[arg(long, default_value = "40")]
    pub timeout_secs: u64,

    /// Polling interval in milliseconds.
    #[arg(long, default_value = "1500")]
    pub interval_ms: u64,
}

/// Arguments for `pubmed-pipeline fetch`.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// PubMed query string (falls back to the PUBMED_QUERY env var).
    #[arg(short, long)]
    pub query: Option<String>,

    /// Maximum number of search results to fetch.
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Where to write the results JSON.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `pubmed-pipeline load`.
#[derive(Parser, Debug)]
pub struct LoadArgs {
    /// Results JSON file to load.
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

/// Arguments for `pubmed-pipeline enrich`.
#[derive(Parser, Debug)]
pub struct EnrichArgs {
    /// Enrichment batch size.
    #[arg(long)]
    pub batch_size: Option<i64>,

    /// Generation model.
    #[arg(short, long)]
    pub model: Option<String>,
}

/// Arguments for `pubmed-pipeline export`.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Output directory for exported CSVs.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the command selected by the parsed CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::WaitDb(args) => wait_db(args).await,
        Commands::InitDb => init_db().await,
        Commands::ResetDb => reset_db().await,
        Commands::Fetch(args) => fetch(args).await,
        Commands::Load(args) => load(args).await,
        Commands::Enrich(args) => enrich(args).await,
        Commands::Views => views().await,
        Commands::Export(args) => export(args).await,
        Commands::Status => status().await,
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(max_results) = args.max_results {
        config.max_results = max_results;
    }
    if let Some(batch_size) = args.batch_size {
        config.enrich_batch_size = batch_size;
    }
    if let Some(output) = args.output {
        config.export_dir = output;
    }

    let orchestrator = PipelineOrchestrator::new(config);
    let report = orchestrator.run(&args.query, args.overwrite).await?;

    println!("\n=== Pipeline Run ===");
    println!("Articles fetched:  {}", report.articles_fetched);
    println!("Articles loaded:   {}", report.articles_loaded);
    println!("Enriched:          {}", report.enrichment.enriched);
    println!("Skipped (no abstract): {}", report.enrichment.skipped_no_abstract);
    println!("Failed:            {}", report.enrichment.failed);
    for file in &report.exports {
        println!("Wrote {} ({} rows)", file.path.display(), file.rows);
    }
    println!("\nDone. Now open the BI tool and press Refresh.");
    Ok(())
}

async fn wait_db(args: WaitDbArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    Database::wait_until_ready(
        &config.database_url,
        Duration::from_secs(args.timeout_secs),
        Duration::from_millis(args.interval_ms),
    )
    .await?;
    println!("Postgres is ready.");
    Ok(())
}

async fn init_db() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let db = Database::connect(&config.database_url).await?;
    db.run_migrations().await?;
    println!("Database schema created/verified successfully.");
    Ok(())
}

async fn reset_db() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let db = Database::connect(&config.database_url).await?;
    db.reset().await?;
    println!("Database cleared successfully.");
    Ok(())
}

async fn fetch(args: FetchArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    let query = config.resolve_query(args.query.as_deref())?;
    if let Some(max_results) = args.max_results {
        config.max_results = max_results;
    }
    if let Some(out) = args.out {
        config.results_path = out;
    }

    let pubmed = PubMedClient::new(&config.contact_email);
    let orchestrator = PipelineOrchestrator::new(config.clone());
    let articles = orchestrator.fetch_stage(&pubmed, &query).await?;

    println!(
        "Saved {} articles to {}",
        articles.len(),
        config.results_path.display()
    );
    for article in articles.iter().take(3) {
        println!("{}", "-".repeat(60));
        println!("PMID:    {}", article.pmid);
        println!("Title:   {}", article.title.as_deref().unwrap_or(""));
        println!("Journal: {}", article.journal.as_deref().unwrap_or(""));
        println!("Date:    {}", article.pubdate.as_deref().unwrap_or(""));
        println!(
            "Authors: {}",
            article
                .authors
                .iter()
                .take(5)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

async fn load(args: LoadArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(input) = args.input {
        config.results_path = input;
    }

    let db = Database::connect(&config.database_url).await?;
    let orchestrator = PipelineOrchestrator::new(config);
    let loaded = orchestrator.load_stage(&db).await?;
    println!("Inserted/updated {loaded} articles.");
    Ok(())
}

async fn enrich(args: EnrichArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(batch_size) = args.batch_size {
        config.enrich_batch_size = batch_size;
    }
    if let Some(model) = args.model {
        config.model = model;
    }

    let api_key = config.require_openai_key()?.to_string();
    let db = Database::connect(&config.database_url).await?;
    let pubmed = PubMedClient::new(&config.contact_email);
    let llm = OpenAiClient::new(api_key);

    let engine = EnrichmentEngine::new(&config.model, config.enrich_batch_size);
    let stats = engine.run(&db, &pubmed, &llm).await?;

    if stats.selected == 0 {
        println!("No new articles to enrich.");
    } else {
        println!(
            "Enriched {} of {} candidates ({} skipped, {} failed).",
            stats.enriched, stats.selected, stats.skipped_no_abstract, stats.failed
        );
    }
    Ok(())
}

async fn views() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let db = Database::connect(&config.database_url).await?;
    db.apply_views().await?;
    println!("Views created/updated successfully.");
    Ok(())
}

async fn export(args: ExportArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(output) = args.output {
        config.export_dir = output;
    }

    let db = Database::connect(&config.database_url).await?;
    let files = export_views(&db, &config.export_dir).await?;
    for file in &files {
        println!("Wrote {} ({} rows)", file.path.display(), file.rows);
    }
    Ok(())
}

async fn status() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let db = Database::connect(&config.database_url).await?;

    let articles = db.article_count().await?;
    let enrichments = db.enrichment_count().await?;
    info!(articles, enrichments, "collected status counts");

    println!("Rows in pubmed_articles:    {articles}");
    println!("Rows in article_enrichment: {enrichments}");

    let recent = db.recent_articles(5).await?;
    if !recent.is_empty() {
        println!("\nNewest articles:");
        for row in recent {
            println!(
                "  {}  {}  {}",
                row.pmid,
                row.pubdate.as_deref().unwrap_or("-"),
                row.title.as_deref().unwrap_or("-")
            );
        }
    }

    let top = db.top_enrichments(5).await?;
    if !top.is_empty() {
        println!("\nTop enriched:");
        for row in top {
            println!(
                "  {}  {:<28} {:>3}  {}",
                row.pmid, row.topic_category, row.relevance_score, row.summary
            );
        }
    }
    Ok(())
}
