//! Integration tests for the OpenAI client.
//!
//! These tests make real API calls.
//! Run with: OPENAI_API_KEY=your_key cargo test --test llm_integration -- --ignored

use pubmed_pipeline::llm::{LlmProvider, OpenAiClient, DEFAULT_MODEL};

fn create_test_client() -> OpenAiClient {
    OpenAiClient::from_env()
        .expect("OPENAI_API_KEY environment variable must be set for integration tests")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_generate_json_returns_parseable_object() {
    let client = create_test_client();

    let raw = client
        .generate_json(
            DEFAULT_MODEL,
            "Return a JSON object with a single key \"ok\" whose value is true.",
        )
        .await
        .expect("generation should succeed");

    assert!(!raw.trim().is_empty(), "response should not be blank");

    let value: serde_json::Value =
        serde_json::from_str(raw.trim()).expect("JSON mode should return valid JSON");
    assert!(value.is_object());
}

#[tokio::test]
#[ignore]
async fn test_enrichment_prompt_round_trip() {
    let client = create_test_client();

    let prompt = pubmed_pipeline::enrich::build_prompt(
        "Salt crystallization damage in fired-clay brick",
        "Background: Sodium sulfate crystallization is a major cause of masonry decay. \
         Results: Crystallization pressure exceeded the tensile strength of the brick.",
    );

    let raw = client
        .generate_json(DEFAULT_MODEL, &prompt)
        .await
        .expect("generation should succeed");

    let enrichment =
        pubmed_pipeline::enrich::parse_enrichment(&raw).expect("response should parse");
    assert!(!enrichment.summary.is_empty());
    assert!((0..=100).contains(&enrichment.relevance_score));
}
