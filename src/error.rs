//! Error types for pipeline operations.
//!
//! Defines error types for the major subsystems:
//! - PubMed E-utilities clients (search, summary, abstract fetch)
//! - Generative-text enrichment
//! - CSV export
//!
//! Storage, configuration and orchestration errors live next to their
//! modules (`storage::DatabaseError`, `pipeline::ConfigError`,
//! `pipeline::PipelineError`).

use thiserror::Error;

/// Errors that can occur while talking to the PubMed E-utilities endpoints.
///
/// The protocol variants carry the diagnostic context that is also logged at
/// the call site (HTTP status, body prefix, response keys) so that a failure
/// propagating up to the process boundary stays debuggable.
#[derive(Debug, Error)]
pub enum PubMedError {
    /// The HTTP request itself failed (connection, timeout, TLS).
    #[error("PubMed request failed: {0}")]
    RequestFailed(String),

    /// The endpoint returned a non-success HTTP status.
    #[error("PubMed returned HTTP {status}: {body_prefix}")]
    HttpStatus { status: u16, body_prefix: String },

    /// The response body was not JSON at all (PubMed sometimes returns HTML).
    #[error("PubMed did not return JSON (status {status}): {body_prefix}")]
    NonJsonResponse { status: u16, body_prefix: String },

    /// A well-formed JSON response was missing the expected envelope key.
    #[error("missing '{key}' in PubMed response (status {status}), got keys: {keys:?}")]
    MissingEnvelope {
        key: &'static str,
        status: u16,
        keys: Vec<String>,
    },

    /// The `idlist` field was present but not a list.
    #[error("'idlist' exists but is not a list: {0}")]
    IdListNotAList(String),

    /// The efetch XML document could not be parsed structurally.
    #[error("failed to parse PubMed XML: {0}")]
    Xml(#[from] quick_xml::DeError),
}

/// Errors that can occur during generative-text enrichment.
#[derive(Debug, Error)]
pub enum LlmError {
    /// `OPENAI_API_KEY` is not set.
    #[error("Missing API key: OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    /// The HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The API returned an error status.
    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// The API response body did not match the expected completion shape.
    #[error("failed to parse API response: {0}")]
    ParseError(String),

    /// The model returned blank text where JSON was requested.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The model returned text that does not parse as JSON.
    #[error("model returned malformed JSON: {0}")]
    MalformedResponse(String),
}

/// Errors that can occur while exporting views to CSV.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Filesystem error creating the output directory or file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Running the view query failed.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A view produced a column type the renderer does not handle.
    #[error("unsupported column type '{type_name}' in column '{column}'")]
    UnsupportedColumnType { column: String, type_name: String },
}
