//! Core data models used throughout a scan run.
//!
//! These types represent the queries, fetched publications, extracted fields
//! and synthesis results that flow through the pipeline. All of them are
//! run-scoped: nothing here outlives a single execution.

use std::collections::{HashMap, HashSet};

/// Source URLs already present in the destination database.
pub type KnownUrlSet = HashSet<String>;

/// One search topic: trimmed, non-empty, not a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Build a query from raw text. Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A publication fetched from the search API, not yet known to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    /// Stable external id (PubMed PMID).
    pub identifier: String,
    pub title: String,
    /// May be empty when the article has no abstract.
    pub abstract_text: String,
    /// `YYYY-MM-DD`.
    pub publication_date: String,
    /// Deduplication key. Compared by exact string equality.
    pub source_url: String,
    /// The query that produced this item.
    pub query: String,
}

impl CandidateItem {
    /// Four-digit year prefix of the publication date.
    pub fn year(&self) -> &str {
        self.publication_date
            .get(..4)
            .unwrap_or(&self.publication_date)
    }
}

/// Candidates returned for one query, after dropping known URLs.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub items: Vec<CandidateItem>,
    /// How many resolved items were dropped because their URL was known.
    pub skipped_known: usize,
}

/// Placeholder for every field when the AI response does not parse.
pub const PARSE_ERROR_PLACEHOLDER: &str = "parse error";
/// Placeholder for every field when the inference call itself fails.
pub const UNAVAILABLE_PLACEHOLDER: &str = "analysis unavailable";
/// Placeholder for a single key the AI response left out.
pub const NOT_EXTRACTED: &str = "Not extracted";

/// Structured fields extracted from one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub summary: String,
    pub methods: String,
    pub population: String,
    pub effect_sizes: String,
    pub hypothesis: String,
}

impl AnalysisResult {
    /// An analysis with every field set to `text`.
    pub fn placeholder(text: &str) -> Self {
        Self {
            summary: text.to_string(),
            methods: text.to_string(),
            population: text.to_string(),
            effect_sizes: text.to_string(),
            hypothesis: text.to_string(),
        }
    }

    /// Whether this result is a degraded placeholder rather than extracted text.
    pub fn is_placeholder(&self) -> bool {
        [PARSE_ERROR_PLACEHOLDER, UNAVAILABLE_PLACEHOLDER].contains(&self.summary.as_str())
            && self.summary == self.methods
            && self.summary == self.hypothesis
    }
}

/// A candidate paired with its analysis; the unit the synthesizer works on.
#[derive(Debug, Clone)]
pub struct AnalyzedItem {
    pub item: CandidateItem,
    pub analysis: AnalysisResult,
}

/// Per-item text relating one item to others in the same batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisFragment {
    pub contradicts: String,
    /// Hypothesis proposed for this item's flagged relationship, if any.
    pub hypothesis: Option<String>,
}

/// Output of the batch synthesis pass.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    /// Keyed by [`CandidateItem::identifier`].
    pub fragments: HashMap<String, SynthesisFragment>,
    /// Batch-wide hypotheses that emerge from reading the items together.
    pub new_hypotheses: String,
}

impl Synthesis {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() && self.new_hypotheses.trim().is_empty()
    }

    pub fn fragment_for(&self, item: &CandidateItem) -> Option<&SynthesisFragment> {
        self.fragments.get(&item.identifier)
    }
}

/// First `max_chars` characters of `text`, with `...` when cut. For log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Result of parsing loosely-typed model output.
///
/// Callers must handle [`ParseOutcome::Unparsed`] explicitly; there is no
/// silent default.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Unparsed { raw: String, reason: String },
}

impl<T> ParseOutcome<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_trims_and_rejects_blank() {
        assert_eq!(Query::new("  sleep  ").unwrap().as_str(), "sleep");
        assert!(Query::new("   ").is_none());
        assert!(Query::new("").is_none());
    }

    #[test]
    fn placeholder_detection() {
        assert!(AnalysisResult::placeholder(PARSE_ERROR_PLACEHOLDER).is_placeholder());
        assert!(AnalysisResult::placeholder(UNAVAILABLE_PLACEHOLDER).is_placeholder());
        let mut real = AnalysisResult::placeholder(PARSE_ERROR_PLACEHOLDER);
        real.methods = "RCT, n=40".into();
        assert!(!real.is_placeholder());
    }

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("éééé", 2), "éé...");
    }

    #[test]
    fn year_of_short_date() {
        let item = CandidateItem {
            identifier: "1".into(),
            title: "t".into(),
            abstract_text: String::new(),
            publication_date: "2024-03-01".into(),
            source_url: "u".into(),
            query: "q".into(),
        };
        assert_eq!(item.year(), "2024");
    }
}
