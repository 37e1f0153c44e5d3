//! PubMed E-utilities clients.
//!
//! Three endpoints of the NCBI E-utilities API are used:
//! - `esearch.fcgi` — free-text search returning a relevance-ranked PMID list
//! - `esummary.fcgi` — bulk bibliographic metadata (title, journal, date, authors)
//! - `efetch.fcgi` — bulk abstract text as XML
//!
//! All requests are GET with `retmode` plus the caller-identification pair
//! (`tool`, `email`) NCBI asks for. No API key is required.

pub mod abstracts;
pub mod client;

pub use client::{ArticleSummary, PubMedClient, EUTILS_BASE, TOOL_NAME};
