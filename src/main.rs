//! # litscan CLI
//!
//! Runs one literature scan and exits.
//!
//! ## Usage
//!
//! ```bash
//! litscan [KEYWORDS] [--config PATH] [--keywords-file PATH]
//! ```
//!
//! Topics are taken from the first source that yields any:
//!
//! | Source | Format |
//! |--------|--------|
//! | `KEYWORDS` argument | `;`-separated |
//! | `KEYWORDS` environment variable | `;`-separated |
//! | keyword file (default `keywords.txt`) | one per line, `#` comments |
//!
//! Credentials come from the environment (or a `.env` file):
//! `GEMINI_API_KEY`, `NOTION_TOKEN`, `NOTION_DATABASE_ID`, and optionally
//! `PUBMED_API_KEY`.
//!
//! Exits non-zero only when the run cannot start. Individual fetch, analysis
//! or publish failures are logged and counted in the summary.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use litscan::config::{self, Secrets, KEYWORDS_ENV};
use litscan::scan;

/// Scan PubMed for new publications, analyze them with Gemini, and record
/// them in a Notion database.
#[derive(Parser)]
#[command(name = "litscan", version)]
struct Cli {
    /// `;`-separated topics. Overrides the environment and the keyword file.
    keywords: Option<String>,

    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/litscan.toml`; built-in defaults apply when that
    /// file does not exist.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keyword file, overriding `keywords.file` from the configuration.
    #[arg(long)]
    keywords_file: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("Failed to load .env");
        }
    }
    init_tracing();

    let cli = Cli::parse();

    let mut cfg = config::load_config_or_default(cli.config.as_deref())?;
    if let Some(path) = cli.keywords_file {
        cfg.keywords.file = path;
    }

    let secrets = Secrets::from_env()?;
    let env_keywords = std::env::var(KEYWORDS_ENV).ok();

    scan::run_scan(&cfg, &secrets, cli.keywords.as_deref(), env_keywords.as_deref()).await?;
    Ok(())
}
