//! efetch abstract XML parsing.
//!
//! PubMed returns a `<PubmedArticleSet>` document where each
//! `<PubmedArticle>` carries its PMID under `<MedlineCitation>` and zero or
//! more `<AbstractText>` sections, optionally labeled
//! (`<AbstractText Label="Background">`). Sections are concatenated into a
//! single string per article, labeled sections prefixed `Label: `, joined
//! with newlines.

use std::collections::HashMap;

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::error::PubMedError;

#[derive(Debug, Deserialize)]
struct PubmedArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Deserialize)]
struct PubmedArticle {
    #[serde(rename = "MedlineCitation")]
    citation: Option<MedlineCitation>,
}

#[derive(Debug, Deserialize)]
struct MedlineCitation {
    #[serde(rename = "PMID")]
    pmid: Option<TextNode>,
    #[serde(rename = "Article")]
    article: Option<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(rename = "Abstract")]
    abstract_section: Option<Abstract>,
}

#[derive(Debug, Deserialize)]
struct Abstract {
    #[serde(rename = "AbstractText", default)]
    sections: Vec<AbstractText>,
}

#[derive(Debug, Deserialize)]
struct AbstractText {
    #[serde(rename = "@Label")]
    label: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text")]
    value: Option<String>,
}

/// Parses an efetch XML document into a PMID → abstract-text map.
///
/// Articles without abstract sections map to the empty string. Article nodes
/// whose PMID cannot be read (missing or non-numeric) are skipped entirely.
pub fn parse_abstract_xml(xml: &str) -> Result<HashMap<i64, String>, PubMedError> {
    let set: PubmedArticleSet = from_str(xml)?;

    let mut abstracts = HashMap::new();
    for article in set.articles {
        let Some(citation) = article.citation else {
            continue;
        };
        let Some(pmid) = citation
            .pmid
            .and_then(|node| node.value)
            .and_then(|text| text.trim().parse::<i64>().ok())
        else {
            debug!("skipping article node without a readable PMID");
            continue;
        };

        let text = citation
            .article
            .and_then(|a| a.abstract_section)
            .map(|a| join_sections(&a.sections))
            .unwrap_or_default();

        abstracts.insert(pmid, text);
    }
    Ok(abstracts)
}

/// Concatenates abstract sections, prefixing labeled ones with `Label: `.
fn join_sections(sections: &[AbstractText]) -> String {
    let mut parts = Vec::with_capacity(sections.len());
    for section in sections {
        let text = section.value.as_deref().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        match &section.label {
            Some(label) => parts.push(format!("{label}: {text}")),
            None => parts.push(text.to_string()),
        }
    }
    parts.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_and_unlabeled_sections_join_in_order() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">38000001</PMID>
      <Article>
        <Abstract>
          <AbstractText Label="Background">Salt weathering damages porous masonry.</AbstractText>
          <AbstractText Label="Results">Crystallization pressure exceeded tensile strength.</AbstractText>
          <AbstractText>Further field validation is needed.</AbstractText>
        </Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let abstracts = parse_abstract_xml(xml).expect("should parse");
        let text = abstracts.get(&38000001).expect("entry should exist");

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Background: Salt weathering damages porous masonry.");
        assert_eq!(
            lines[1],
            "Results: Crystallization pressure exceeded tensile strength."
        );
        assert_eq!(lines[2], "Further field validation is needed.");
    }

    #[test]
    fn test_article_without_abstract_yields_empty_string() {
        let xml = r#"<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>38000002</PMID>
      <Article></Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let abstracts = parse_abstract_xml(xml).expect("should parse");
        assert_eq!(abstracts.get(&38000002).map(String::as_str), Some(""));
    }

    #[test]
    fn test_article_without_pmid_is_skipped() {
        let xml = r#"<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <Article>
        <Abstract><AbstractText>Orphan abstract.</AbstractText></Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>38000003</PMID>
      <Article>
        <Abstract><AbstractText>Kept abstract.</AbstractText></Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let abstracts = parse_abstract_xml(xml).expect("should parse");
        assert_eq!(abstracts.len(), 1);
        assert_eq!(
            abstracts.get(&38000003).map(String::as_str),
            Some("Kept abstract.")
        );
    }

    #[test]
    fn test_blank_sections_are_dropped() {
        let xml = r#"<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>38000004</PMID>
      <Article>
        <Abstract>
          <AbstractText Label="Background">  </AbstractText>
          <AbstractText>Only real content survives.</AbstractText>
        </Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let abstracts = parse_abstract_xml(xml).expect("should parse");
        assert_eq!(
            abstracts.get(&38000004).map(String::as_str),
            Some("Only real content survives.")
        );
    }

    #[test]
    fn test_empty_article_set() {
        let xml = "<PubmedArticleSet></PubmedArticleSet>";
        let abstracts = parse_abstract_xml(xml).expect("should parse");
        assert!(abstracts.is_empty());
    }
}
