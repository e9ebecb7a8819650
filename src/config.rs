//! Configuration: an optional TOML file for tuning plus environment secrets.
//!
//! Both halves are resolved once in `main` and passed by reference into every
//! component. Nothing below `main` reads process state.
//!
//! ```toml
//! [search]
//! results_per_query = 5
//!
//! [inference]
//! model = "gemini-2.0-flash-lite"
//!
//! [notion.properties]
//! effect_sizes = "EffectsSizes"
//!
//! [pacing]
//! analysis_delay_ms = 1000
//!
//! [dedup]
//! within_run = true
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ScanError;

/// Default location of the optional config file.
pub const DEFAULT_CONFIG_PATH: &str = "./config/litscan.toml";
/// Environment variable holding a `;`-separated keyword override.
pub const KEYWORDS_ENV: &str = "KEYWORDS";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub notion: NotionConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            results_per_query: default_results_per_query(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}
fn default_results_per_query() -> usize {
    5
}
fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_base_url(),
            model: default_model(),
            timeout_secs: default_inference_timeout_secs(),
        }
    }
}

fn default_inference_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
fn default_inference_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConfig {
    #[serde(default = "default_notion_base_url")]
    pub base_url: String,
    #[serde(default = "default_notion_version")]
    pub api_version: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub properties: PropertyNames,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            base_url: default_notion_base_url(),
            api_version: default_notion_version(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            properties: PropertyNames::default(),
        }
    }
}

fn default_notion_base_url() -> String {
    "https://api.notion.com".to_string()
}
fn default_notion_version() -> String {
    "2022-06-28".to_string()
}
fn default_page_size() -> u32 {
    100
}

/// Database property names. Matched verbatim by the database; no
/// normalization is applied.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PropertyNames {
    pub title: String,
    pub date: String,
    pub summary: String,
    pub methods: String,
    pub population: String,
    pub effect_sizes: String,
    pub hypothesis: String,
    pub contradicts: String,
    pub link: String,
    pub query: String,
    pub status: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: "Name".to_string(),
            date: "Date".to_string(),
            summary: "Summary".to_string(),
            methods: "Methods".to_string(),
            population: "Population".to_string(),
            effect_sizes: "EffectsSizes".to_string(),
            hypothesis: "Hypothesis".to_string(),
            contradicts: "Contradicts".to_string(),
            link: "Link".to_string(),
            query: "Query".to_string(),
            status: "Status".to_string(),
        }
    }
}

impl PropertyNames {
    fn all(&self) -> [(&'static str, &str); 11] {
        [
            ("title", self.title.as_str()),
            ("date", self.date.as_str()),
            ("summary", self.summary.as_str()),
            ("methods", self.methods.as_str()),
            ("population", self.population.as_str()),
            ("effect_sizes", self.effect_sizes.as_str()),
            ("hypothesis", self.hypothesis.as_str()),
            ("contradicts", self.contradicts.as_str()),
            ("link", self.link.as_str()),
            ("query", self.query.as_str()),
            ("status", self.status.as_str()),
        ]
    }
}

/// Fixed delays between remote calls. These keep the run under the remote
/// rate limits and depend on calls never overlapping.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PacingConfig {
    /// Between the search and detail phases of one query.
    pub search_delay_ms: u64,
    /// Between successive query fetches.
    pub query_delay_ms: u64,
    /// After each per-item analysis call.
    pub analysis_delay_ms: u64,
    /// After each publish call.
    pub publish_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            search_delay_ms: 350,
            query_delay_ms: 350,
            analysis_delay_ms: 1000,
            publish_delay_ms: 500,
        }
    }
}

impl PacingConfig {
    /// All delays zero. Used by tests and dry local runs against mocks.
    pub fn none() -> Self {
        Self {
            search_delay_ms: 0,
            query_delay_ms: 0,
            analysis_delay_ms: 0,
            publish_delay_ms: 0,
        }
    }

    pub fn search_delay(&self) -> Duration {
        Duration::from_millis(self.search_delay_ms)
    }
    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }
    pub fn analysis_delay(&self) -> Duration {
        Duration::from_millis(self.analysis_delay_ms)
    }
    pub fn publish_delay(&self) -> Duration {
        Duration::from_millis(self.publish_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    /// Treat URLs accepted earlier in the same run as already known.
    #[serde(default = "default_within_run")]
    pub within_run: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            within_run: default_within_run(),
        }
    }
}

fn default_within_run() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordsConfig {
    #[serde(default = "default_keywords_file")]
    pub file: PathBuf,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            file: default_keywords_file(),
        }
    }
}

fn default_keywords_file() -> PathBuf {
    PathBuf::from("keywords.txt")
}

/// API credentials and the database target.
#[derive(Clone)]
pub struct Secrets {
    pub gemini_api_key: String,
    pub notion_token: String,
    pub notion_database_id: String,
    /// Raises the PubMed rate limit when present.
    pub pubmed_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("gemini_api_key", &"<redacted>")
            .field("notion_token", &"<redacted>")
            .field("notion_database_id", &self.notion_database_id)
            .field("pubmed_api_key", &self.pubmed_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Secrets {
    /// Read secrets from the process environment.
    pub fn from_env() -> Result<Self, ScanError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read secrets through `lookup`. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScanError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gemini_api_key = get("GEMINI_API_KEY");
        let notion_token = get("NOTION_TOKEN");
        let notion_database_id = get("NOTION_DATABASE_ID");

        let missing: Vec<&str> = [
            ("GEMINI_API_KEY", gemini_api_key.is_none()),
            ("NOTION_TOKEN", notion_token.is_none()),
            ("NOTION_DATABASE_ID", notion_database_id.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect();

        match (gemini_api_key, notion_token, notion_database_id) {
            (Some(gemini_api_key), Some(notion_token), Some(notion_database_id)) => Ok(Self {
                gemini_api_key,
                notion_token,
                notion_database_id,
                pubmed_api_key: get("PUBMED_API_KEY"),
            }),
            _ => Err(ScanError::Configuration(format!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Load `path` when given; otherwise the default location if it exists,
/// falling back to built-in defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_config(default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if !(1..=100).contains(&config.search.results_per_query) {
        bail!("search.results_per_query must be in [1, 100]");
    }

    if config.inference.model.trim().is_empty() {
        bail!("inference.model must not be empty");
    }

    if !(1..=100).contains(&config.notion.page_size) {
        bail!("notion.page_size must be in [1, 100]");
    }

    for (key, name) in config.notion.properties.all() {
        if name.trim().is_empty() {
            bail!("notion.properties.{} must not be empty", key);
        }
    }

    for (key, url) in [
        ("search.base_url", &config.search.base_url),
        ("inference.base_url", &config.inference.base_url),
        ("notion.base_url", &config.notion.base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("{} must be an http(s) URL, got '{}'", key, url);
        }
    }

    Ok(())
}
