//! Generative-text integration for article enrichment.
//!
//! A single OpenAI chat-completions client is used in JSON mode: the
//! enrichment prompt asks for a JSON object and the request carries
//! `response_format: {"type": "json_object"}` so the model is constrained to
//! emit one. The [`LlmProvider`] trait is the seam the enrichment engine is
//! written against, so tests can substitute a scripted provider.

pub mod openai;

pub use openai::{LlmProvider, OpenAiClient, DEFAULT_MODEL, OPENAI_API_BASE};
