//! Service seams between the pipeline and its three remote collaborators.
//!
//! The orchestrator only ever talks to these traits. The HTTP clients in
//! [`pubmed`](crate::pubmed), [`inference`](crate::inference) and
//! [`notion`](crate::notion) are the production implementations; tests swap
//! in in-memory ones.
//!
//! ```text
//! ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │ LiteratureSource │  │ InferenceClient  │  │   RecordStore    │
//! │   (PubMed)       │  │   (Gemini)       │  │   (Notion)       │
//! └────────┬─────────┘  └────────┬─────────┘  └────────┬─────────┘
//!          └─────────────────────┼─────────────────────┘
//!                                ▼
//!                         run_scan_with()
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{Fetched, KnownUrlSet, Query};

// ═══════════════════════════════════════════════════════════════════════
// Literature search
// ═══════════════════════════════════════════════════════════════════════

/// A literature search backend.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Short label used in log lines (e.g. `"pubmed"`).
    fn name(&self) -> &str;

    /// Fetch up to the configured number of candidates for `query`,
    /// dropping any whose `source_url` is in `known`.
    ///
    /// Fails with [`ScanError::Fetch`](crate::error::ScanError::Fetch) when
    /// either the search or the detail call is unsuccessful.
    async fn fetch_candidates(
        &self,
        query: &Query,
        known: &KnownUrlSet,
    ) -> Result<Fetched>;
}

// ═══════════════════════════════════════════════════════════════════════
// AI inference
// ═══════════════════════════════════════════════════════════════════════

/// A text-generation backend asked for JSON payloads.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.0-flash-lite"`).
    fn model_name(&self) -> &str;

    /// Send `prompt` and return the generated text verbatim. The text may
    /// still carry code fences or other formatting around the JSON.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ═══════════════════════════════════════════════════════════════════════
// Document database
// ═══════════════════════════════════════════════════════════════════════

/// The destination database.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every stored record's URL value, reading all pages.
    async fn known_urls(&self) -> Result<KnownUrlSet>;

    /// Create one record from a map of property name to property value.
    async fn create_record(&self, properties: Value) -> Result<()>;
}
