//! Mapping analyzed items onto the database's property schema.
//!
//! Property names come verbatim from [`PropertyNames`]; nothing here
//! normalizes or guesses them. Value shapes follow the Notion page API:
//! `title` / `rich_text` arrays of text objects, `date.start`, `url`, and
//! `select.name`.

use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PropertyNames;
use crate::error::Result;
use crate::models::{preview, AnalysisResult, CandidateItem, SynthesisFragment};
use crate::traits::RecordStore;

/// Notion rejects rich text content longer than this.
pub const RICH_TEXT_LIMIT: usize = 2000;

pub const STATUS_NEW: &str = "New";
pub const STATUS_FLAGGED: &str = "Flagged";

/// Contradiction text containing any of these means "nothing to flag".
const NON_FLAGGING_PHRASES: [&str; 3] = ["no direct contradictions", "unavailable", "only one"];

pub struct Publisher<'a> {
    store: &'a dyn RecordStore,
    names: &'a PropertyNames,
    delay: Duration,
}

impl<'a> Publisher<'a> {
    /// `delay` is slept after every publish attempt.
    pub fn new(store: &'a dyn RecordStore, names: &'a PropertyNames, delay: Duration) -> Self {
        Self {
            store,
            names,
            delay,
        }
    }

    pub async fn publish(
        &self,
        item: &CandidateItem,
        analysis: &AnalysisResult,
        fragment: Option<&SynthesisFragment>,
        new_hypotheses: &str,
    ) -> Result<()> {
        let properties = build_properties(self.names, item, analysis, fragment, new_hypotheses);
        let outcome = self.store.create_record(properties).await;
        tokio::time::sleep(self.delay).await;

        match &outcome {
            Ok(()) => info!(title = %preview(&item.title, 55), "published"),
            Err(e) => warn!(title = %preview(&item.title, 55), error = %e, "publish failed"),
        }
        outcome
    }
}

/// Build the `properties` object for one record.
pub fn build_properties(
    names: &PropertyNames,
    item: &CandidateItem,
    analysis: &AnalysisResult,
    fragment: Option<&SynthesisFragment>,
    new_hypotheses: &str,
) -> Value {
    let contradicts = fragment.map(|f| f.contradicts.as_str()).unwrap_or_default();
    let hypothesis = merge_hypothesis(
        &analysis.hypothesis,
        fragment.and_then(|f| f.hypothesis.as_deref()),
        new_hypotheses,
    );
    let status = if is_flagged(contradicts) {
        STATUS_FLAGGED
    } else {
        STATUS_NEW
    };

    let mut props = Map::new();
    props.insert(names.title.clone(), json!({ "title": rich_text(&item.title) }));
    props.insert(
        names.date.clone(),
        json!({ "date": { "start": item.publication_date } }),
    );
    props.insert(names.summary.clone(), rich_text_property(&analysis.summary));
    props.insert(names.methods.clone(), rich_text_property(&analysis.methods));
    props.insert(names.population.clone(), rich_text_property(&analysis.population));
    props.insert(names.effect_sizes.clone(), rich_text_property(&analysis.effect_sizes));
    props.insert(names.hypothesis.clone(), rich_text_property(&hypothesis));
    props.insert(names.contradicts.clone(), rich_text_property(contradicts));
    props.insert(names.link.clone(), json!({ "url": item.source_url }));
    props.insert(names.query.clone(), rich_text_property(&item.query));
    props.insert(names.status.clone(), json!({ "select": { "name": status } }));

    Value::Object(props)
}

/// A single-segment rich text array, truncated to [`RICH_TEXT_LIMIT`] chars.
pub fn rich_text(text: &str) -> Value {
    let content: String = text.chars().take(RICH_TEXT_LIMIT).collect();
    json!([{ "type": "text", "text": { "content": content } }])
}

fn rich_text_property(text: &str) -> Value {
    json!({ "rich_text": rich_text(text) })
}

/// Item hypothesis, then the synthesis hypothesis, then the batch-wide
/// hypotheses under a heading. Empty parts are skipped.
pub fn merge_hypothesis(item: &str, fragment: Option<&str>, new_hypotheses: &str) -> String {
    let cross = if new_hypotheses.trim().is_empty() {
        String::new()
    } else {
        format!("[Cross-paper hypotheses]\n{}", new_hypotheses.trim())
    };

    [item.trim(), fragment.unwrap_or_default().trim(), cross.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn is_flagged(contradicts: &str) -> bool {
    let lower = contradicts.trim().to_lowercase();
    !lower.is_empty() && !NON_FLAGGING_PHRASES.iter().any(|p| lower.contains(p))
}
