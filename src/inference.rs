//! Gemini inference client and model-output parsing.
//!
//! Calls `POST {base}/models/{model}:generateContent` with the prompt as a
//! single user turn and `responseMimeType = application/json`. The generated
//! text is returned verbatim; callers run it through [`parse_json_payload`],
//! which strips code fences and yields a tagged [`ParseOutcome`].
//!
//! No retry: a failed call is reported once and the caller degrades.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::InferenceConfig;
use crate::error::{Result, ScanError};
use crate::models::ParseOutcome;
use crate::traits::InferenceClient;

/// Gemini REST client implementing [`InferenceClient`].
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &InferenceConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
            },
        });

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ScanError::Inference(format!("{}: {}", status, body_text)));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ScanError::Inference(format!("unreadable response: {}", e)))?;

        parsed.text().ok_or_else(|| {
            let reason = parsed
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            ScanError::Inference(format!("response contained no text ({})", reason))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

// ============ Payload parsing ============

/// Remove a surrounding Markdown code fence, if any.
///
/// A fence counts only when it opens the text or starts a line; backticks
/// inside a JSON string are left alone.
///
/// ```rust
/// use litscan::inference::strip_code_fence;
///
/// assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
/// assert_eq!(strip_code_fence("{\"a\": \"```R```\"}"), "{\"a\": \"```R```\"}");
/// ```
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = fence_start(trimmed) else {
        return trimmed;
    };

    let after = &trimmed[start + 3..];
    let body = match after.find('\n') {
        Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &after[nl + 1..]
        }
        _ => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn fence_start(text: &str) -> Option<usize> {
    if text.starts_with("```") {
        return Some(0);
    }
    text.find("\n```").map(|i| i + 1)
}

/// Parse model output into JSON, stripping fences and surrounding prose.
pub fn parse_json_payload(text: &str) -> ParseOutcome<Value> {
    let trimmed = text.trim();

    let first_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => return ParseOutcome::Parsed(v),
        Err(e) => e,
    };

    let inner = strip_code_fence(trimmed);
    if inner.len() != trimmed.len() {
        if let Ok(v) = serde_json::from_str::<Value>(inner) {
            return ParseOutcome::Parsed(v);
        }
    }

    // Prose around an unfenced payload: take the outermost object or array.
    for candidate in [outermost_json(inner), outermost_json(trimmed)].into_iter().flatten() {
        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
            return ParseOutcome::Parsed(v);
        }
    }

    ParseOutcome::Unparsed {
        raw: text.to_string(),
        reason: first_err.to_string(),
    }
}

fn outermost_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Render a JSON value as field text: strings verbatim, arrays of strings
/// joined by `"; "`, anything else as compact JSON. `null` is `None`.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        other => Some(other.to_string()),
    }
}
