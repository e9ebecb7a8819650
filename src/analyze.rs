//! Per-item structured extraction.
//!
//! Each candidate gets one inference call asking for five named text fields.
//! Failures never propagate: an unparseable response degrades the item to
//! [`PARSE_ERROR_PLACEHOLDER`] and a failed call degrades it to
//! [`UNAVAILABLE_PLACEHOLDER`]. Either way the item still reaches publishing.

use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::inference::{parse_json_payload, value_to_text};
use crate::models::{
    preview, AnalysisResult, CandidateItem, ParseOutcome, NOT_EXTRACTED,
    PARSE_ERROR_PLACEHOLDER, UNAVAILABLE_PLACEHOLDER,
};
use crate::traits::InferenceClient;

/// The keys the model is asked to return, in prompt order.
pub const ANALYSIS_KEYS: [&str; 5] = [
    "summary",
    "methods",
    "population",
    "effect_sizes",
    "hypothesis",
];

pub struct ItemAnalyzer<'a> {
    client: &'a dyn InferenceClient,
    delay: Duration,
}

impl<'a> ItemAnalyzer<'a> {
    /// `delay` is slept after every call, successful or not.
    pub fn new(client: &'a dyn InferenceClient, delay: Duration) -> Self {
        Self { client, delay }
    }

    pub async fn analyze(&self, item: &CandidateItem) -> AnalysisResult {
        let prompt = build_analysis_prompt(item);
        let response = self.client.generate(&prompt).await;
        tokio::time::sleep(self.delay).await;

        let text = match response {
            Ok(text) => text,
            Err(e) => {
                warn!(title = %preview(&item.title, 50), error = %e, "analysis call failed");
                return AnalysisResult::placeholder(UNAVAILABLE_PLACEHOLDER);
            }
        };

        match parse_analysis(&text) {
            ParseOutcome::Parsed(result) => result,
            ParseOutcome::Unparsed { raw, reason } => {
                let err = ScanError::AnalysisParse(reason);
                warn!(title = %preview(&item.title, 50), error = %err, "analysis degraded to placeholders");
                debug!(raw = %preview(&raw, 500), "unparsed analysis response");
                AnalysisResult::placeholder(PARSE_ERROR_PLACEHOLDER)
            }
        }
    }
}

pub fn build_analysis_prompt(item: &CandidateItem) -> String {
    let abstract_text = if item.abstract_text.trim().is_empty() {
        "(no abstract available)"
    } else {
        item.abstract_text.as_str()
    };

    format!(
        r#"You are a biomedical research assistant. Analyze this study and return structured JSON.

Title: {title}
Abstract: {abstract_text}

Return ONLY valid JSON with exactly these keys:
- summary: One clear sentence summarizing the main finding.
- methods: Study design and methods used (e.g. RCT, cohort, n=X, duration).
- population: Who was studied (age range, condition, inclusion criteria).
- effect_sizes: Key quantitative results (OR, HR, p-values, confidence intervals). If not reported, say "Not reported".
- hypothesis: One concrete new research question or grant idea this finding inspires.
"#,
        title = item.title,
    )
}

/// Parse a model response into the five analysis fields.
///
/// A top-level array contributes its first element. Keys the model left out
/// become [`NOT_EXTRACTED`].
pub fn parse_analysis(text: &str) -> ParseOutcome<AnalysisResult> {
    let value = match parse_json_payload(text) {
        ParseOutcome::Parsed(v) => v,
        ParseOutcome::Unparsed { raw, reason } => return ParseOutcome::Unparsed { raw, reason },
    };

    let object = match first_object(value) {
        Some(obj) => obj,
        None => {
            return ParseOutcome::Unparsed {
                raw: text.to_string(),
                reason: "expected a JSON object".to_string(),
            }
        }
    };

    let field = |key: &str| {
        object
            .get(key)
            .and_then(value_to_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| NOT_EXTRACTED.to_string())
    };

    ParseOutcome::Parsed(AnalysisResult {
        summary: field("summary"),
        methods: field("methods"),
        population: field("population"),
        effect_sizes: field("effect_sizes"),
        hypothesis: field("hypothesis"),
    })
}

fn first_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(obj) => Some(obj),
        Value::Array(items) => items.into_iter().next().and_then(|v| match v {
            Value::Object(obj) => Some(obj),
            _ => None,
        }),
        _ => None,
    }
}
