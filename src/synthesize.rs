//! Cross-item synthesis over the whole run's batch.
//!
//! One inference call reads every analyzed item at once and reports, per
//! item, whether it conflicts with others in the batch. Two response shapes
//! are accepted:
//!
//! - per-item: `{"items": [{"id", "title", "contradicts", "hypothesis"}], "new_hypotheses"}`
//!   (a bare top-level array is taken as the `items` list);
//! - batch-level: `{"contradictions": "...", "new_hypotheses": "..."}`, where
//!   the single `contradictions` text applies to every item.
//!
//! Any failure yields an empty [`Synthesis`]; publishing never waits on it.

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::inference::{parse_json_payload, value_to_text};
use crate::models::{AnalyzedItem, ParseOutcome, Synthesis, SynthesisFragment};
use crate::traits::InferenceClient;

/// Batches smaller than this skip the inference call entirely.
pub const MIN_BATCH_FOR_SYNTHESIS: usize = 2;

/// Result of one synthesis pass.
#[derive(Debug, Default)]
pub struct SynthesisPass {
    pub synthesis: Synthesis,
    /// Whether the inference client was called, whatever the outcome.
    pub called: bool,
}

pub struct BatchSynthesizer<'a> {
    client: &'a dyn InferenceClient,
}

impl<'a> BatchSynthesizer<'a> {
    pub fn new(client: &'a dyn InferenceClient) -> Self {
        Self { client }
    }

    /// Run the synthesis pass. Makes at most one inference call.
    pub async fn synthesize(&self, items: &[AnalyzedItem]) -> SynthesisPass {
        if items.len() < MIN_BATCH_FOR_SYNTHESIS {
            debug!(items = items.len(), "batch too small for synthesis");
            return SynthesisPass::default();
        }

        info!(items = items.len(), model = self.client.model_name(), "synthesizing batch");
        let prompt = build_synthesis_prompt(items);
        let response = self.client.generate(&prompt).await;

        let synthesis = match response {
            Ok(text) => match parse_synthesis(&text, items) {
                ParseOutcome::Parsed(synthesis) => synthesis,
                ParseOutcome::Unparsed { reason, .. } => {
                    let err = ScanError::SynthesisParse(reason);
                    warn!(error = %err, "synthesis response ignored");
                    Synthesis::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "synthesis call failed; continuing without it");
                Synthesis::default()
            }
        };

        SynthesisPass {
            synthesis,
            called: true,
        }
    }
}

pub fn build_synthesis_prompt(items: &[AnalyzedItem]) -> String {
    let listing = items
        .iter()
        .map(|a| {
            format!(
                "[{}] {} ({}): {}",
                a.item.identifier,
                a.item.title,
                a.item.year(),
                a.analysis.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are a research synthesis expert reviewing {count} recent papers.

{listing}

Return ONLY valid JSON of this shape:
{{"items": [{{"id": "<id in brackets>", "title": "<paper title>", "contradicts": "<how this paper conflicts with others in the list, citing their ids>", "hypothesis": "<at least one novel, testable hypothesis that could explain or resolve this conflict>"}}], "new_hypotheses": "<2-3 novel research hypotheses that emerge from reading these studies together>"}}

Only list papers whose findings conflict with another paper in the list. Every listed paper must have a non-empty "contradicts" and a non-empty "hypothesis". If none conflict, return an empty items list.
"#,
        count = items.len(),
    )
}

/// Parse a synthesis response against the batch it was asked about.
///
/// Entries that match no batch item are dropped. When several entries match
/// the same item, their texts are joined with newlines.
pub fn parse_synthesis(text: &str, items: &[AnalyzedItem]) -> ParseOutcome<Synthesis> {
    let value = match parse_json_payload(text) {
        ParseOutcome::Parsed(v) => v,
        ParseOutcome::Unparsed { raw, reason } => return ParseOutcome::Unparsed { raw, reason },
    };

    let (entries, root) = match value {
        Value::Array(entries) => (entries, Map::new()),
        Value::Object(mut obj) => {
            let entries = match obj.remove("items") {
                Some(Value::Array(entries)) => entries,
                Some(Value::Null) | None => Vec::new(),
                Some(_) => {
                    return ParseOutcome::Unparsed {
                        raw: text.to_string(),
                        reason: "\"items\" is not an array".to_string(),
                    }
                }
            };
            (entries, obj)
        }
        _ => {
            return ParseOutcome::Unparsed {
                raw: text.to_string(),
                reason: "expected a JSON object or array".to_string(),
            }
        }
    };

    let mut fragments: HashMap<String, SynthesisFragment> = HashMap::new();

    for entry in &entries {
        let Value::Object(entry) = entry else {
            continue;
        };
        let Some(identifier) = match_item(entry, items) else {
            debug!(keys = ?entry.keys().collect::<Vec<_>>(), "synthesis entry matches no item");
            continue;
        };

        let contradicts = text_field(entry, "contradicts");
        let hypothesis = text_field(entry, "hypothesis");
        if contradicts.is_empty() && hypothesis.is_empty() {
            continue;
        }

        let fragment = fragments.entry(identifier.to_string()).or_default();
        append_line(&mut fragment.contradicts, &contradicts);
        if !hypothesis.is_empty() {
            let merged = fragment.hypothesis.get_or_insert_with(String::new);
            append_line(merged, &hypothesis);
        }
    }

    // Batch-level contradiction text is shared by every item without its own entry.
    let shared = text_field(&root, "contradictions");
    if !shared.is_empty() {
        for a in items {
            fragments
                .entry(a.item.identifier.clone())
                .or_insert_with(|| SynthesisFragment {
                    contradicts: shared.clone(),
                    hypothesis: None,
                });
        }
    }

    ParseOutcome::Parsed(Synthesis {
        fragments,
        new_hypotheses: text_field(&root, "new_hypotheses"),
    })
}

/// Identifier of the batch item an entry refers to: by id, then by title.
fn match_item<'i>(entry: &Map<String, Value>, items: &'i [AnalyzedItem]) -> Option<&'i str> {
    let ids: Vec<String> = ["id", "pmid", "identifier"]
        .iter()
        .filter_map(|key| entry.get(*key))
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().trim_matches(['[', ']']).to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    if let Some(found) = items
        .iter()
        .find(|a| ids.iter().any(|id| *id == a.item.identifier))
    {
        return Some(&found.item.identifier);
    }

    let title = entry.get("title").and_then(Value::as_str)?.trim();
    if title.is_empty() {
        return None;
    }
    items
        .iter()
        .find(|a| a.item.title.trim().eq_ignore_ascii_case(title))
        .map(|a| a.item.identifier.as_str())
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(value_to_text).unwrap_or_default()
}

fn append_line(target: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::{AnalysisResult, CandidateItem};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed response and counts calls.
    struct ScriptedClient {
        reply: Option<String>,
        calls: Mutex<usize>,
    }

    impl ScriptedClient {
        fn new(reply: Option<&str>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            self.reply
                .clone()
                .ok_or_else(|| ScanError::Inference("503 Service Unavailable".into()))
        }
    }

    fn analyzed(id: &str, title: &str, summary: &str) -> AnalyzedItem {
        let mut analysis = AnalysisResult::placeholder("x");
        analysis.summary = summary.to_string();
        AnalyzedItem {
            item: CandidateItem {
                identifier: id.to_string(),
                title: title.to_string(),
                abstract_text: String::new(),
                publication_date: "2023-07-01".to_string(),
                source_url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id),
                query: "q".to_string(),
            },
            analysis,
        }
    }

    fn batch() -> Vec<AnalyzedItem> {
        vec![
            analyzed("111", "Vitamin D improves mood", "Mood improved."),
            analyzed("222", "Vitamin D has no effect on mood", "No change."),
            analyzed("333", "Sleep and memory", "Memory improved."),
        ]
    }

    #[test]
    fn prompt_lists_each_item_with_id_and_year() {
        let prompt = build_synthesis_prompt(&batch());
        assert!(prompt.contains("[111] Vitamin D improves mood (2023): Mood improved."));
        assert!(prompt.contains("[333] Sleep and memory (2023): Memory improved."));
        assert!(prompt.contains("reviewing 3 recent papers"));
    }

    #[test]
    fn matches_by_id_then_title() {
        let text = r#"{
            "items": [
                {"id": "111", "title": "ignored", "contradicts": "Conflicts with [222]", "hypothesis": "Dose matters"},
                {"title": "VITAMIN D HAS NO EFFECT ON MOOD", "contradicts": "Conflicts with [111]"}
            ],
            "new_hypotheses": "Baseline status moderates response."
        }"#;
        let ParseOutcome::Parsed(s) = parse_synthesis(text, &batch()) else {
            panic!("expected Parsed");
        };
        assert_eq!(s.fragments.len(), 2);
        assert_eq!(s.fragments["111"].contradicts, "Conflicts with [222]");
        assert_eq!(s.fragments["111"].hypothesis.as_deref(), Some("Dose matters"));
        assert_eq!(s.fragments["222"].contradicts, "Conflicts with [111]");
        assert_eq!(s.fragments["222"].hypothesis, None);
        assert!(!s.fragments.contains_key("333"));
        assert_eq!(s.new_hypotheses, "Baseline status moderates response.");
    }

    #[test]
    fn top_level_array_is_items_list() {
        let text = r#"[{"id": 333, "contradicts": "Odd one out"}]"#;
        let ParseOutcome::Parsed(s) = parse_synthesis(text, &batch()) else {
            panic!("expected Parsed");
        };
        assert_eq!(s.fragments["333"].contradicts, "Odd one out");
        assert!(s.new_hypotheses.is_empty());
    }

    #[test]
    fn batch_level_contradictions_apply_to_all() {
        let text = r#"{"contradictions": "Papers 1 and 2 disagree.", "new_hypotheses": ["A", "B"]}"#;
        let ParseOutcome::Parsed(s) = parse_synthesis(text, &batch()) else {
            panic!("expected Parsed");
        };
        assert_eq!(s.fragments.len(), 3);
        assert!(s
            .fragments
            .values()
            .all(|f| f.contradicts == "Papers 1 and 2 disagree."));
        assert_eq!(s.new_hypotheses, "A; B");
    }

    #[test]
    fn repeated_entries_are_joined() {
        let text = r#"{"items": [
            {"id": "111", "contradicts": "vs 222"},
            {"id": "[111]", "contradicts": "vs 333"}
        ]}"#;
        let ParseOutcome::Parsed(s) = parse_synthesis(text, &batch()) else {
            panic!("expected Parsed");
        };
        assert_eq!(s.fragments["111"].contradicts, "vs 222\nvs 333");
    }

    #[test]
    fn unknown_entries_dropped_and_bad_shapes_unparsed() {
        let ParseOutcome::Parsed(s) =
            parse_synthesis(r#"{"items": [{"id": "999", "contradicts": "?"}]}"#, &batch())
        else {
            panic!("expected Parsed");
        };
        assert!(s.is_empty());

        assert!(!parse_synthesis(r#"{"items": "nope"}"#, &batch()).is_parsed());
        assert!(!parse_synthesis("\"just text\"", &batch()).is_parsed());
        assert!(!parse_synthesis("no json", &batch()).is_parsed());
    }

    #[test]
    fn prompt_requires_hypothesis_for_each_listed_paper() {
        let prompt = build_synthesis_prompt(&batch());
        assert!(prompt.contains("at least one novel, testable hypothesis"));
        assert!(prompt.contains("must have a non-empty \"contradicts\" and a non-empty \"hypothesis\""));
    }

    #[tokio::test]
    async fn small_batch_reports_no_call() {
        let client = ScriptedClient::new(Some("{}"));
        let pass = BatchSynthesizer::new(&client)
            .synthesize(&batch()[..1])
            .await;
        assert!(!pass.called);
        assert_eq!(client.calls(), 0);
        assert!(pass.synthesis.is_empty());

        let pass = BatchSynthesizer::new(&client).synthesize(&[]).await;
        assert!(!pass.called);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn failed_call_still_reports_called() {
        let client = ScriptedClient::new(None);
        let pass = BatchSynthesizer::new(&client).synthesize(&batch()).await;
        assert!(pass.called);
        assert_eq!(client.calls(), 1);
        assert!(pass.synthesis.is_empty());
    }

    #[tokio::test]
    async fn parsed_call_reports_called_with_fragments() {
        let client = ScriptedClient::new(Some(
            r#"{"items": [{"id": "111", "contradicts": "vs [222]", "hypothesis": "Dose"}]}"#,
        ));
        let pass = BatchSynthesizer::new(&client).synthesize(&batch()).await;
        assert!(pass.called);
        assert_eq!(client.calls(), 1);
        assert_eq!(pass.synthesis.fragments["111"].hypothesis.as_deref(), Some("Dose"));
    }
}
