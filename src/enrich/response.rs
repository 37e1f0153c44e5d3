//! Parsing of the model's enrichment JSON.
//!
//! The model is asked for a JSON object with four keys. Extraction is
//! best-effort: a missing or uncoercible field falls back to its default
//! (empty summary, no keywords, `other` category, score 0) rather than
//! failing the candidate. Only a response that is not JSON at all is an
//! error.

use std::fmt;

use serde_json::Value;

use crate::error::LlmError;

/// Fixed closed set of topic categories the prompt offers the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicCategory {
    SaltCrystallization,
    MasonryMaterials,
    FiniteElementModelling,
    DurabilityDegradation,
    Other,
}

impl TopicCategory {
    /// All categories, in the order they appear in the prompt.
    pub const ALL: [TopicCategory; 5] = [
        TopicCategory::SaltCrystallization,
        TopicCategory::MasonryMaterials,
        TopicCategory::FiniteElementModelling,
        TopicCategory::DurabilityDegradation,
        TopicCategory::Other,
    ];

    /// The label used in the prompt and stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicCategory::SaltCrystallization => "salt crystallization",
            TopicCategory::MasonryMaterials => "masonry materials",
            TopicCategory::FiniteElementModelling => "finite element / modelling",
            TopicCategory::DurabilityDegradation => "durability / degradation",
            TopicCategory::Other => "other",
        }
    }

    /// Maps a model-returned label back into the closed set.
    ///
    /// Anything outside the five known labels folds into `Other`, keeping the
    /// stored category within the closed set no matter what the model says.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(TopicCategory::Other)
    }
}

impl fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed enrichment, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub summary: String,
    pub keywords: Vec<String>,
    pub topic_category: TopicCategory,
    pub relevance_score: i32,
}

/// Number of response characters logged when the payload is not valid JSON.
const MALFORMED_PREVIEW_CHARS: usize = 300;

/// Parses the model's response text into an [`Enrichment`].
///
/// # Errors
///
/// [`LlmError::MalformedResponse`] if the text (after stripping a possible
/// markdown fence) does not parse as JSON; the error carries the first 300
/// characters for diagnostics.
pub fn parse_enrichment(raw: &str) -> Result<Enrichment, LlmError> {
    let payload = extract_json_object(raw);
    let value: Value = serde_json::from_str(payload).map_err(|_| {
        LlmError::MalformedResponse(raw.chars().take(MALFORMED_PREVIEW_CHARS).collect())
    })?;

    Ok(Enrichment {
        summary: value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        keywords: value
            .get("keywords")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        topic_category: value
            .get("topic_category")
            .and_then(Value::as_str)
            .map(TopicCategory::from_label)
            .unwrap_or(TopicCategory::Other),
        relevance_score: coerce_score(value.get("relevance_score")),
    })
}

/// Coerces the relevance score to an integer in [0, 100].
///
/// Accepts integers, floats (truncated) and numeric strings; anything else
/// defaults to 0.
fn coerce_score(value: Option<&Value>) -> i32 {
    let score = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    };
    score.clamp(0, 100) as i32
}

/// Extracts the JSON object payload from a model response.
///
/// JSON mode should return bare JSON, but models occasionally wrap output in
/// a markdown fence or lead with prose. Strategies, in order: content that
/// already starts with `{`, a fenced block, the outermost brace pair.
fn extract_json_object(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }

    if let Some(fence_start) = trimmed.find("```") {
        let after_fence = &trimmed[fence_start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(fence_end) = body.find("```") {
            return body[..fence_end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_response_parses() {
        let raw = r#"{
            "summary": "Crystallization pressure drives masonry decay.",
            "keywords": ["salt", "masonry", "sodium sulfate", "decay", "pores"],
            "topic_category": "salt crystallization",
            "relevance_score": 92
        }"#;

        let enrichment = parse_enrichment(raw).expect("should parse");
        assert_eq!(
            enrichment.summary,
            "Crystallization pressure drives masonry decay."
        );
        assert_eq!(enrichment.keywords.len(), 5);
        assert_eq!(enrichment.topic_category, TopicCategory::SaltCrystallization);
        assert_eq!(enrichment.relevance_score, 92);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        // relevance_score and topic_category absent: score 0, category other.
        let raw = r#"{"summary": "Short note.", "keywords": ["a", "b"]}"#;

        let enrichment = parse_enrichment(raw).expect("should parse");
        assert_eq!(enrichment.relevance_score, 0);
        assert_eq!(enrichment.topic_category, TopicCategory::Other);
    }

    #[test]
    fn test_uncoercible_fields_fall_back_to_defaults() {
        let raw = r#"{
            "summary": 42,
            "keywords": "not a list",
            "topic_category": ["list"],
            "relevance_score": {"value": 80}
        }"#;

        let enrichment = parse_enrichment(raw).expect("should parse");
        assert_eq!(enrichment.summary, "");
        assert!(enrichment.keywords.is_empty());
        assert_eq!(enrichment.topic_category, TopicCategory::Other);
        assert_eq!(enrichment.relevance_score, 0);
    }

    #[test]
    fn test_unknown_category_folds_to_other() {
        let raw = r#"{"topic_category": "geology"}"#;
        let enrichment = parse_enrichment(raw).expect("should parse");
        assert_eq!(enrichment.topic_category, TopicCategory::Other);
    }

    #[test]
    fn test_score_coercion_variants() {
        for (raw, expected) in [
            (r#"{"relevance_score": "85"}"#, 85),
            (r#"{"relevance_score": 77.9}"#, 77),
            (r#"{"relevance_score": -5}"#, 0),
            (r#"{"relevance_score": 250}"#, 100),
            (r#"{"relevance_score": "high"}"#, 0),
        ] {
            let enrichment = parse_enrichment(raw).expect("should parse");
            assert_eq!(enrichment.relevance_score, expected, "raw: {raw}");
        }
    }

    #[test]
    fn test_non_json_is_malformed() {
        let err = parse_enrichment("I cannot answer that.").unwrap_err();
        match err {
            LlmError::MalformedResponse(preview) => {
                assert!(preview.starts_with("I cannot"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fenced_json_is_unwrapped() {
        let raw = "```json\n{\"summary\": \"fenced\", \"relevance_score\": 10}\n```";
        let enrichment = parse_enrichment(raw).expect("should parse");
        assert_eq!(enrichment.summary, "fenced");
        assert_eq!(enrichment.relevance_score, 10);
    }

    #[test]
    fn test_prose_wrapped_json_is_extracted() {
        let raw = "Here is the analysis: {\"summary\": \"wrapped\"} Hope this helps.";
        let enrichment = parse_enrichment(raw).expect("should parse");
        assert_eq!(enrichment.summary, "wrapped");
    }

    #[test]
    fn test_category_label_round_trip() {
        for category in TopicCategory::ALL {
            assert_eq!(TopicCategory::from_label(category.as_str()), category);
        }
        assert_eq!(
            TopicCategory::from_label("  Salt Crystallization "),
            TopicCategory::SaltCrystallization
        );
    }
}
