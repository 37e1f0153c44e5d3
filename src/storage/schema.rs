//! Database schema and view definitions.
//!
//! Two persisted tables (`pubmed_articles`, `article_enrichment`) plus the
//! read-only views the exporter serializes for the BI tool. Tables go
//! through the migration runner; views are `CREATE OR REPLACE`d on every
//! `views` invocation so their definitions can evolve without migrations.

/// SQL for creating the articles table.
pub const CREATE_ARTICLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pubmed_articles (
    pmid BIGINT PRIMARY KEY,
    title TEXT,
    journal TEXT,
    pubdate TEXT,
    authors JSONB NOT NULL DEFAULT '[]',
    fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL for creating the enrichment table.
///
/// No foreign key to `pubmed_articles`: the anti-join in candidate selection
/// is the only referential link, and a full reset truncates both tables
/// independently.
pub const CREATE_ENRICHMENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS article_enrichment (
    pmid BIGINT PRIMARY KEY,
    summary TEXT NOT NULL DEFAULT '',
    keywords JSONB NOT NULL DEFAULT '[]',
    topic_category TEXT NOT NULL DEFAULT 'other',
    relevance_score INTEGER NOT NULL DEFAULT 0,
    model_name TEXT NOT NULL,
    prompt_version TEXT NOT NULL,
    processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL for creating the indexes the views lean on.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_enrichment_category ON article_enrichment(topic_category);
CREATE INDEX IF NOT EXISTS idx_enrichment_relevance ON article_enrichment(relevance_score)
"#;

/// Returns all schema statements as (name, sql) pairs, in apply order.
///
/// Names are recorded in the `_migrations` table, so they must stay stable
/// once shipped.
pub fn all_schema_statements() -> Vec<(&'static str, &'static str)> {
    vec![
        ("create_pubmed_articles", CREATE_ARTICLES_TABLE),
        ("create_article_enrichment", CREATE_ENRICHMENT_TABLE),
        ("create_enrichment_indexes", CREATE_INDEXES),
    ]
}

/// Joined article + enrichment rows, one per enriched article.
pub const CREATE_VW_ARTICLES_ENRICHED: &str = r#"
CREATE OR REPLACE VIEW vw_articles_enriched AS
SELECT
    a.pmid,
    a.title,
    a.journal,
    a.pubdate,
    substring(a.pubdate FROM '\d{4}')::int AS pub_year,
    a.authors,
    a.fetched_at,
    e.summary,
    e.keywords,
    e.topic_category,
    e.relevance_score,
    e.model_name,
    e.prompt_version,
    e.processed_at
FROM pubmed_articles a
JOIN article_enrichment e ON e.pmid = a.pmid
"#;

/// Article count and mean relevance per topic category.
pub const CREATE_VW_CATEGORY_COUNTS: &str = r#"
CREATE OR REPLACE VIEW vw_category_counts AS
SELECT
    topic_category,
    COUNT(*) AS article_count,
    AVG(relevance_score)::float8 AS avg_relevance
FROM article_enrichment
GROUP BY topic_category
ORDER BY article_count DESC
"#;

/// Most frequent keywords across all enrichments.
pub const CREATE_VW_TOP_KEYWORDS: &str = r#"
CREATE OR REPLACE VIEW vw_top_keywords AS
SELECT
    lower(k.keyword) AS keyword,
    COUNT(*) AS occurrences
FROM article_enrichment e,
     jsonb_array_elements_text(e.keywords) AS k(keyword)
GROUP BY lower(k.keyword)
ORDER BY occurrences DESC
LIMIT 50
"#;

/// Recently processed articles with high relevance scores.
pub const CREATE_VW_RECENT_HIGH_RELEVANCE: &str = r#"
CREATE OR REPLACE VIEW vw_recent_high_relevance AS
SELECT
    a.pmid,
    a.title,
    a.journal,
    a.pubdate,
    e.topic_category,
    e.relevance_score,
    e.summary,
    e.processed_at
FROM pubmed_articles a
JOIN article_enrichment e ON e.pmid = a.pmid
WHERE e.relevance_score >= 70
ORDER BY e.processed_at DESC, e.relevance_score DESC
LIMIT 100
"#;

/// Publication counts per year, extracted from the free-text pubdate.
pub const CREATE_VW_PUBS_BY_YEAR: &str = r#"
CREATE OR REPLACE VIEW vw_pubs_by_year AS
SELECT
    substring(pubdate FROM '\d{4}')::int AS pub_year,
    COUNT(*) AS article_count
FROM pubmed_articles
WHERE substring(pubdate FROM '\d{4}') IS NOT NULL
GROUP BY 1
ORDER BY 1
"#;

/// Category distribution over publication years.
pub const CREATE_VW_CATEGORY_OVER_TIME: &str = r#"
CREATE OR REPLACE VIEW vw_category_over_time AS
SELECT
    substring(a.pubdate FROM '\d{4}')::int AS pub_year,
    e.topic_category,
    COUNT(*) AS article_count
FROM pubmed_articles a
JOIN article_enrichment e ON e.pmid = a.pmid
WHERE substring(a.pubdate FROM '\d{4}') IS NOT NULL
GROUP BY 1, 2
ORDER BY 1, 2
"#;

/// Returns all view statements in apply order.
pub fn all_view_statements() -> Vec<&'static str> {
    vec![
        CREATE_VW_ARTICLES_ENRICHED,
        CREATE_VW_CATEGORY_COUNTS,
        CREATE_VW_TOP_KEYWORDS,
        CREATE_VW_RECENT_HIGH_RELEVANCE,
        CREATE_VW_PUBS_BY_YEAR,
        CREATE_VW_CATEGORY_OVER_TIME,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statement_names_are_unique() {
        let statements = all_schema_statements();
        let mut names: Vec<_> = statements.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), statements.len());
    }

    #[test]
    fn test_every_view_statement_is_create_or_replace() {
        for sql in all_view_statements() {
            assert!(sql.trim_start().starts_with("CREATE OR REPLACE VIEW vw_"));
        }
    }
}
