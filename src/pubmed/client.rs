//! esearch/esummary JSON clients.
//!
//! The response parsing is factored out of the HTTP calls so that the
//! protocol-error paths (non-JSON body, missing envelope, malformed id list)
//! are unit-testable without a network.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::PubMedError;

use super::abstracts;

/// Base URL of the NCBI E-utilities API.
pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Tool name sent with every request, per NCBI usage guidelines.
pub const TOOL_NAME: &str = "pubmed-ai-pipeline";

/// Maximum number of response-body characters included in diagnostics.
const BODY_PREVIEW_CHARS: usize = 300;

/// Bibliographic metadata for one article, as returned by esummary.
///
/// Also the record format of the intermediate `data/pubmed_results.json`
/// file consumed by the persistence loader. All bibliographic fields are
/// nullable; PubMed omits them freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub pmid: String,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub pubdate: Option<String>,
    pub authors: Vec<String>,
}

/// Client for the PubMed E-utilities endpoints.
pub struct PubMedClient {
    http: Client,
    base_url: String,
    email: String,
}

impl PubMedClient {
    /// Creates a client identifying the caller by `email`.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: EUTILS_BASE.to_string(),
            email: email.into(),
        }
    }

    /// Overrides the E-utilities base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn id_params(&self, ids: &str) -> Vec<(&'static str, String)> {
        vec![
            ("db", "pubmed".to_string()),
            ("id", ids.to_string()),
            ("tool", TOOL_NAME.to_string()),
            ("email", self.email.clone()),
        ]
    }

    /// Searches PubMed and returns PMIDs in the order the service ranked them.
    ///
    /// Non-fatal anomalies (`errorlist`/`warninglist` inside a well-formed
    /// envelope) are logged and do not abort the call. A structurally
    /// unexpected response is a [`PubMedError`] after the diagnostic context
    /// has been logged.
    pub async fn esearch(&self, query: &str, retmax: usize) -> Result<Vec<String>, PubMedError> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let params = [
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmode", "json".to_string()),
            ("retmax", retmax.to_string()),
            ("tool", TOOL_NAME.to_string()),
            ("email", self.email.clone()),
        ];

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PubMedError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PubMedError::RequestFailed(e.to_string()))?;

        let pmids = parse_esearch_body(status, &body)?;
        debug!(count = pmids.len(), "esearch returned PMIDs");
        Ok(pmids)
    }

    /// Fetches bibliographic summaries for `pmids` in one bulk request.
    ///
    /// Empty input short-circuits without a network call. PMIDs the service
    /// does not echo back in `result.uids` are silently absent.
    pub async fn esummary(&self, pmids: &[String]) -> Result<Vec<ArticleSummary>, PubMedError> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/esummary.fcgi", self.base_url);
        let mut params = self.id_params(&pmids.join(","));
        params.push(("retmode", "json".to_string()));

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PubMedError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PubMedError::RequestFailed(e.to_string()))?;

        if status >= 400 {
            return Err(PubMedError::HttpStatus {
                status,
                body_prefix: preview(&body),
            });
        }

        let summaries = parse_esummary_body(status, &body)?;
        info!(
            requested = pmids.len(),
            returned = summaries.len(),
            "esummary completed"
        );
        Ok(summaries)
    }

    /// Fetches abstract text for `pmids` via efetch (XML).
    ///
    /// Returns a map from PMID to abstract text. Articles present in the
    /// response but without abstract sections map to the empty string;
    /// article nodes with no readable PMID are skipped.
    pub async fn fetch_abstracts(&self, pmids: &[i64]) -> Result<HashMap<i64, String>, PubMedError> {
        if pmids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/efetch.fcgi", self.base_url);
        let ids = pmids
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut params = self.id_params(&ids);
        params.push(("retmode", "xml".to_string()));

        let response = self
            .http
            .get(&url)
            .query(&params)
            // Abstract payloads are larger than the JSON endpoints' output.
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| PubMedError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let xml = response
            .text()
            .await
            .map_err(|e| PubMedError::RequestFailed(e.to_string()))?;

        if status >= 400 {
            return Err(PubMedError::HttpStatus {
                status,
                body_prefix: preview(&xml),
            });
        }

        let abstracts = abstracts::parse_abstract_xml(&xml)?;
        info!(
            requested = pmids.len(),
            returned = abstracts.len(),
            "efetch abstracts completed"
        );
        Ok(abstracts)
    }
}

/// Truncates a response body for diagnostics, respecting char boundaries.
fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// Parses an esearch response body into a PMID list.
fn parse_esearch_body(status: u16, body: &str) -> Result<Vec<String>, PubMedError> {
    let data: Value = serde_json::from_str(body).map_err(|_| {
        warn!(status, body_prefix = %preview(body), "PubMed did not return JSON");
        PubMedError::NonJsonResponse {
            status,
            body_prefix: preview(body),
        }
    })?;

    let result = data.get("esearchresult").ok_or_else(|| {
        let keys = top_level_keys(&data);
        warn!(status, ?keys, "missing 'esearchresult' in PubMed response");
        PubMedError::MissingEnvelope {
            key: "esearchresult",
            status,
            keys,
        }
    })?;

    // PubMed reports query problems inline rather than via HTTP status.
    if let Some(errors) = result.get("errorlist") {
        warn!(errorlist = %errors, "PubMed returned an errorlist");
    }
    if let Some(warnings) = result.get("warninglist") {
        warn!(warninglist = %warnings, "PubMed returned a warninglist");
    }

    match result.get("idlist") {
        None => Ok(Vec::new()),
        Some(Value::Array(ids)) => Ok(ids
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()),
        Some(other) => {
            warn!(status, idlist = %other, "'idlist' exists but is not a list");
            Err(PubMedError::IdListNotAList(other.to_string()))
        }
    }
}

/// Parses an esummary response body into article summaries.
///
/// One record is produced per uid listed in `result.uids`; uids without a
/// matching entry still yield a record with null fields, matching the
/// service's own envelope semantics.
fn parse_esummary_body(status: u16, body: &str) -> Result<Vec<ArticleSummary>, PubMedError> {
    let data: Value = serde_json::from_str(body).map_err(|_| PubMedError::NonJsonResponse {
        status,
        body_prefix: preview(body),
    })?;

    let result = data.get("result").ok_or_else(|| PubMedError::MissingEnvelope {
        key: "result",
        status,
        keys: top_level_keys(&data),
    })?;

    let uids = result
        .get("uids")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut summaries = Vec::with_capacity(uids.len());
    for uid in uids.iter().filter_map(Value::as_str) {
        let item = result.get(uid).cloned().unwrap_or(Value::Null);
        summaries.push(ArticleSummary {
            pmid: uid.to_string(),
            title: field_str(&item, "title"),
            journal: field_str(&item, "fulljournalname"),
            pubdate: field_str(&item, "pubdate"),
            authors: author_names(&item),
        });
    }
    Ok(summaries)
}

fn top_level_keys(data: &Value) -> Vec<String> {
    data.as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

fn field_str(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(String::from)
}

/// Extracts ordered author display names from the nested `authors` records.
fn author_names(item: &Value) -> Vec<String> {
    item.get("authors")
        .and_then(Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_esearch_body_returns_ordered_pmids() {
        let body = r#"{
            "header": {"type": "esearch"},
            "esearchresult": {
                "count": "3",
                "idlist": ["38000001", "37999999", "37000123"]
            }
        }"#;

        let pmids = parse_esearch_body(200, body).expect("should parse");
        assert_eq!(pmids, vec!["38000001", "37999999", "37000123"]);
    }

    #[test]
    fn test_parse_esearch_body_rejects_non_json() {
        let body = "<html><body>Bad gateway</body></html>";

        let err = parse_esearch_body(502, body).unwrap_err();
        match err {
            PubMedError::NonJsonResponse { status, body_prefix } => {
                assert_eq!(status, 502);
                assert!(body_prefix.starts_with("<html>"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_esearch_body_rejects_missing_envelope() {
        let body = r#"{"header": {"type": "esearch"}, "error": "bad request"}"#;

        let err = parse_esearch_body(200, body).unwrap_err();
        match err {
            PubMedError::MissingEnvelope { key, keys, .. } => {
                assert_eq!(key, "esearchresult");
                assert!(keys.contains(&"error".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_esearch_body_rejects_non_list_idlist() {
        let body = r#"{"esearchresult": {"idlist": "38000001"}}"#;

        let err = parse_esearch_body(200, body).unwrap_err();
        assert!(matches!(err, PubMedError::IdListNotAList(_)));
    }

    #[test]
    fn test_parse_esearch_body_tolerates_errorlist() {
        // An errorlist inside a well-formed envelope is logged, not fatal.
        let body = r#"{
            "esearchresult": {
                "errorlist": {"phrasesnotfound": ["zzzz"]},
                "warninglist": {"outputmessages": ["No items found."]},
                "idlist": []
            }
        }"#;

        let pmids = parse_esearch_body(200, body).expect("should parse");
        assert!(pmids.is_empty());
    }

    #[test]
    fn test_parse_esummary_body_extracts_fields() {
        let body = r#"{
            "result": {
                "uids": ["38000001", "37999999"],
                "38000001": {
                    "title": "Salt damage in brick masonry",
                    "fulljournalname": "Construction and Building Materials",
                    "pubdate": "2024 Jan 15",
                    "authors": [
                        {"name": "Lubelli B", "authtype": "Author"},
                        {"name": "van Hees R", "authtype": "Author"}
                    ]
                },
                "37999999": {
                    "title": "Untitled preprint",
                    "authors": []
                }
            }
        }"#;

        let summaries = parse_esummary_body(200, body).expect("should parse");
        assert_eq!(summaries.len(), 2);

        let first = &summaries[0];
        assert_eq!(first.pmid, "38000001");
        assert_eq!(first.title.as_deref(), Some("Salt damage in brick masonry"));
        assert_eq!(
            first.journal.as_deref(),
            Some("Construction and Building Materials")
        );
        assert_eq!(first.pubdate.as_deref(), Some("2024 Jan 15"));
        assert_eq!(first.authors, vec!["Lubelli B", "van Hees R"]);

        let second = &summaries[1];
        assert_eq!(second.journal, None);
        assert_eq!(second.pubdate, None);
        assert!(second.authors.is_empty());
    }

    #[test]
    fn test_parse_esummary_body_keeps_uids_without_entries() {
        let body = r#"{"result": {"uids": ["123"]}}"#;

        let summaries = parse_esummary_body(200, body).expect("should parse");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].pmid, "123");
        assert_eq!(summaries[0].title, None);
    }

    #[test]
    fn test_author_without_name_is_dropped() {
        let body = r#"{
            "result": {
                "uids": ["123"],
                "123": {"authors": [{"authtype": "CollectiveName"}, {"name": "Doe J"}]}
            }
        }"#;

        let summaries = parse_esummary_body(200, body).expect("should parse");
        assert_eq!(summaries[0].authors, vec!["Doe J"]);
    }
}
