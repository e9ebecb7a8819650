//! PubMed literature fetcher.
//!
//! Uses the NCBI E-utilities in two phases per query:
//!
//! 1. `esearch.fcgi` (JSON) returns the PMIDs for the query, newest first.
//! 2. `efetch.fcgi` (XML) resolves all PMIDs in one batched call.
//!
//! A fixed delay separates the two phases. Without an API key NCBI allows
//! three requests per second; a key raises that limit but is never required.
//!
//! # Article mapping
//!
//! | Field | Source |
//! |-------|--------|
//! | `identifier` | `MedlineCitation/PMID` |
//! | `title` | `ArticleTitle` including nested markup, default `"No Title"` |
//! | `abstract_text` | every `AbstractText` section, joined with a space |
//! | `publication_date` | `PubDate/Year` + `PubDate/Month` as `YYYY-MM-01` |
//! | `source_url` | `https://pubmed.ncbi.nlm.nih.gov/{pmid}/` |

use async_trait::async_trait;
use chrono::Datelike;
use quick_xml::events::Event;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::{PacingConfig, SearchConfig};
use crate::error::{Result, ScanError};
use crate::models::{CandidateItem, Fetched, KnownUrlSet, Query};
use crate::traits::LiteratureSource;

const ARTICLE_URL_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// E-utilities client implementing [`LiteratureSource`].
pub struct PubmedClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    results_per_query: usize,
    search_delay: Duration,
}

impl PubmedClient {
    pub fn new(
        config: &SearchConfig,
        pacing: &PacingConfig,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            results_per_query: config.results_per_query,
            search_delay: pacing.search_delay(),
        })
    }

    fn auth_params(&self) -> Vec<(&'static str, String)> {
        match &self.api_key {
            Some(key) => vec![("api_key", key.clone())],
            None => Vec::new(),
        }
    }

    /// Phase 1: PMIDs for `query`, in the order the API returns them.
    async fn search_ids(&self, query: &Query) -> Result<Vec<String>> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.as_str().to_string()),
            ("retmode", "json".to_string()),
            ("retmax", self.results_per_query.to_string()),
            ("sort", "date".to_string()),
        ];
        params.extend(self.auth_params());

        let resp = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| fetch_error(query, format!("search request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_error(query, format!("search returned {}", status)));
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| fetch_error(query, format!("unreadable search response: {}", e)))?;

        Ok(body.esearchresult.idlist)
    }

    /// Phase 2: one batched detail call for all `ids`.
    async fn fetch_articles(&self, query: &Query, ids: &[String]) -> Result<Vec<PubmedArticle>> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        params.extend(self.auth_params());

        let resp = self
            .client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| fetch_error(query, format!("detail request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_error(query, format!("detail fetch returned {}", status)));
        }

        let xml = resp
            .text()
            .await
            .map_err(|e| fetch_error(query, format!("unreadable detail response: {}", e)))?;

        parse_efetch_xml(&xml).map_err(|e| fetch_error(query, e))
    }
}

#[async_trait]
impl LiteratureSource for PubmedClient {
    fn name(&self) -> &str {
        "pubmed"
    }

    async fn fetch_candidates(
        &self,
        query: &Query,
        known: &KnownUrlSet,
    ) -> Result<Fetched> {
        let ids = self.search_ids(query).await?;
        debug!(query = %query, ids = ids.len(), "esearch complete");
        if ids.is_empty() {
            return Ok(Fetched::default());
        }

        tokio::time::sleep(self.search_delay).await;

        let articles = self.fetch_articles(query, &ids).await?;
        let mut by_pmid: HashMap<String, PubmedArticle> = articles
            .into_iter()
            .map(|a| (a.pmid.clone(), a))
            .collect();

        let current_year = chrono::Utc::now().year();
        let mut fetched = Fetched::default();
        for pmid in &ids {
            let Some(article) = by_pmid.remove(pmid) else {
                debug!(pmid = %pmid, "no article in detail response");
                continue;
            };
            let item = article.into_candidate(query, current_year);
            if known.contains(&item.source_url) {
                debug!(url = %item.source_url, "already known, skipping");
                fetched.skipped_known += 1;
                continue;
            }
            fetched.items.push(item);
        }

        fetched.items.truncate(self.results_per_query);
        Ok(fetched)
    }
}

fn fetch_error(query: &Query, message: String) -> ScanError {
    ScanError::Fetch {
        query: query.to_string(),
        message,
    }
}

// ============ esearch (JSON) ============

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize, Default)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

// ============ efetch (XML) ============

/// Raw fields of one `PubmedArticle` element.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PubmedArticle {
    pub pmid: String,
    pub title: String,
    pub abstract_parts: Vec<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    /// Free-form fallback such as `"2023 Jan-Feb"` when `Year` is absent.
    pub medline_date: Option<String>,
}

impl PubmedArticle {
    /// Build the candidate; `current_year` fills in a missing year.
    pub fn into_candidate(self, query: &Query, current_year: i32) -> CandidateItem {
        let title = collapse_whitespace(&self.title);
        let title = if title.is_empty() {
            "No Title".to_string()
        } else {
            title
        };

        let year = self
            .year
            .as_deref()
            .map(str::trim)
            .filter(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .or_else(|| {
                self.medline_date
                    .as_deref()
                    .and_then(|d| d.trim().get(..4))
                    .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| current_year.to_string());

        let month = normalize_month(self.month.as_deref());

        CandidateItem {
            source_url: format!("{}/{}/", ARTICLE_URL_BASE, self.pmid),
            identifier: self.pmid,
            title,
            abstract_text: self
                .abstract_parts
                .iter()
                .map(|p| collapse_whitespace(p))
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            publication_date: format!("{}-{}-01", year, month),
            query: query.to_string(),
        }
    }
}

/// Map `Jan`..`Dec` (any case, full names too) or a number to `01`..`12`.
/// Anything else becomes `01`.
pub fn normalize_month(raw: Option<&str>) -> String {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];

    let Some(raw) = raw.map(str::trim).filter(|m| !m.is_empty()) else {
        return "01".to_string();
    };

    if let Ok(n) = raw.parse::<u32>() {
        if (1..=12).contains(&n) {
            return format!("{:02}", n);
        }
        return "01".to_string();
    }

    let prefix = raw.get(..3).unwrap_or(raw).to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| format!("{:02}", i + 1))
        .unwrap_or_else(|| "01".to_string())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an efetch `PubmedArticleSet` document.
pub fn parse_efetch_xml(xml: &str) -> std::result::Result<Vec<PubmedArticle>, String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut articles = Vec::new();
    let mut current: Option<PubmedArticle> = None;
    let mut abstract_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"PubmedArticle" => current = Some(PubmedArticle::default()),
                    b"AbstractText" => abstract_buf.clear(),
                    _ => {}
                }
                stack.push(name);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"PubmedArticle" => {
                        if let Some(article) = current.take() {
                            if !article.pmid.is_empty() {
                                articles.push(article);
                            }
                        }
                    }
                    b"AbstractText" => {
                        if let Some(article) = current.as_mut() {
                            article.abstract_parts.push(abstract_buf.clone());
                        }
                    }
                    _ => {}
                }
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                if let Some(article) = current.as_mut() {
                    route_text(&stack, &text, article, &mut abstract_buf);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "invalid detail XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    Ok(articles)
}

fn route_text(stack: &[Vec<u8>], text: &str, article: &mut PubmedArticle, abstract_buf: &mut String) {
    let within = |tag: &[u8]| stack.iter().any(|s| s.as_slice() == tag);
    let tail = |parent: &[u8], child: &[u8]| {
        stack.len() >= 2
            && stack[stack.len() - 1].as_slice() == child
            && stack[stack.len() - 2].as_slice() == parent
    };

    if tail(b"MedlineCitation", b"PMID") {
        if article.pmid.is_empty() {
            article.pmid = text.trim().to_string();
        }
    } else if within(b"ArticleTitle") {
        article.title.push_str(text);
    } else if within(b"AbstractText") {
        abstract_buf.push_str(text);
    } else if tail(b"PubDate", b"Year") {
        if article.year.is_none() {
            article.year = Some(text.trim().to_string());
        }
    } else if tail(b"PubDate", b"Month") {
        if article.month.is_none() {
            article.month = Some(text.trim().to_string());
        }
    } else if tail(b"PubDate", b"MedlineDate") {
        if article.medline_date.is_none() {
            article.medline_date = Some(text.trim().to_string());
        }
    }
}
