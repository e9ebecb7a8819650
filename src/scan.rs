//! Run orchestration.
//!
//! Coordinates one full scan: queries → known URLs → fetch + analyze per
//! query → one batch synthesis → publish per item. Every remote call is
//! awaited before the next one starts, and only pre-flight failures
//! (no queries, missing credentials) abort the run. Everything after that is
//! logged, counted in the [`ScanReport`], and skipped.

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, warn};

use crate::analyze::ItemAnalyzer;
use crate::config::{Config, Secrets};
use crate::inference::GeminiClient;
use crate::models::{AnalyzedItem, KnownUrlSet, Query};
use crate::notion::{fetch_known_urls, NotionClient};
use crate::publish::Publisher;
use crate::pubmed::PubmedClient;
use crate::queries::resolve_queries;
use crate::synthesize::BatchSynthesizer;
use crate::traits::{InferenceClient, LiteratureSource, RecordStore};

/// Counts describing one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub queries: usize,
    pub queries_failed: usize,
    /// New candidates accepted for analysis.
    pub found: usize,
    /// Candidates dropped as already stored or already seen this run.
    pub skipped: usize,
    pub analyzed: usize,
    /// Analyses that fell back to placeholder text.
    pub analysis_degraded: usize,
    pub published: usize,
    pub failed: usize,
    pub synthesis_calls: usize,
}

impl ScanReport {
    /// Print the summary block to stdout.
    pub fn print(&self) {
        println!("scan");
        println!("  queries: {}", self.queries);
        if self.queries_failed > 0 {
            println!("  queries failed: {}", self.queries_failed);
        }
        println!("  found: {}", self.found);
        println!("  skipped (known): {}", self.skipped);
        println!("  analyzed: {}", self.analyzed);
        if self.analysis_degraded > 0 {
            println!("  analysis degraded: {}", self.analysis_degraded);
        }
        println!("  synthesis calls: {}", self.synthesis_calls);
        println!("  published: {}", self.published);
        if self.failed > 0 {
            println!("  failed: {}", self.failed);
        }
        println!("ok");
    }
}

/// Resolve queries, build the production clients, and run a scan.
///
/// `run_time_keywords` is the CLI argument and `env_keywords` the value of
/// the keyword environment variable; both are `;`-separated.
pub async fn run_scan(
    config: &Config,
    secrets: &Secrets,
    run_time_keywords: Option<&str>,
    env_keywords: Option<&str>,
) -> Result<ScanReport> {
    let (_, queries) = resolve_queries(run_time_keywords, env_keywords, &config.keywords.file)?;

    let source = PubmedClient::new(&config.search, &config.pacing, secrets.pubmed_api_key.clone())
        .context("Failed to build PubMed client")?;
    let inference = GeminiClient::new(&config.inference, secrets.gemini_api_key.clone())
        .context("Failed to build Gemini client")?;
    let store = NotionClient::new(
        &config.notion,
        secrets.notion_token.clone(),
        secrets.notion_database_id.clone(),
    )
    .context("Failed to build Notion client")?;

    let report = run_scan_with(config, &queries, &source, &inference, &store).await;
    report.print();
    Ok(report)
}

/// Run a scan against arbitrary service implementations.
pub async fn run_scan_with(
    config: &Config,
    queries: &[Query],
    source: &dyn LiteratureSource,
    inference: &dyn InferenceClient,
    store: &dyn RecordStore,
) -> ScanReport {
    let started = Local::now();
    info!(started = %started.format("%Y-%m-%d %H:%M"), queries = queries.len(), "scan started");

    let mut report = ScanReport {
        queries: queries.len(),
        ..Default::default()
    };

    let mut known: KnownUrlSet = match fetch_known_urls(store).await {
        Ok(urls) => urls,
        Err(e) => {
            warn!(error = %e, "could not read existing records; treating every candidate as new");
            KnownUrlSet::new()
        }
    };

    // ── Fetch + analyze, per query ──
    let analyzer = ItemAnalyzer::new(inference, config.pacing.analysis_delay());
    let mut batch: Vec<AnalyzedItem> = Vec::new();

    for (i, query) in queries.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(config.pacing.query_delay()).await;
        }
        info!(query = %query, source = source.name(), "fetching");

        let fetched = match source.fetch_candidates(query, &known).await {
            Ok(f) => f,
            Err(e) => {
                warn!(query = %query, error = %e, "fetch failed; skipping query");
                report.queries_failed += 1;
                continue;
            }
        };
        report.skipped += fetched.skipped_known;

        let mut accepted = Vec::with_capacity(fetched.items.len());
        for item in fetched.items {
            if config.dedup.within_run {
                if !known.insert(item.source_url.clone()) {
                    report.skipped += 1;
                    continue;
                }
            } else if known.contains(&item.source_url) {
                report.skipped += 1;
                continue;
            }
            accepted.push(item);
        }

        if accepted.is_empty() {
            info!(query = %query, "no new items");
            continue;
        }
        info!(query = %query, new = accepted.len(), "new items to analyze");
        report.found += accepted.len();

        for item in accepted {
            let analysis = analyzer.analyze(&item).await;
            report.analyzed += 1;
            if analysis.is_placeholder() {
                report.analysis_degraded += 1;
            }
            batch.push(AnalyzedItem { item, analysis });
        }
    }

    // ── Synthesize once ──
    let pass = BatchSynthesizer::new(inference).synthesize(&batch).await;
    if pass.called {
        report.synthesis_calls += 1;
    }
    let synthesis = pass.synthesis;

    // ── Publish ──
    let publisher = Publisher::new(store, &config.notion.properties, config.pacing.publish_delay());
    for entry in &batch {
        let fragment = synthesis.fragment_for(&entry.item);
        match publisher
            .publish(&entry.item, &entry.analysis, fragment, &synthesis.new_hypotheses)
            .await
        {
            Ok(()) => report.published += 1,
            Err(_) => report.failed += 1,
        }
    }

    let finished = Local::now();
    info!(
        finished = %finished.format("%Y-%m-%d %H:%M"),
        published = report.published,
        failed = report.failed,
        "scan complete"
    );
    report
}
