//! # litscan
//!
//! An unattended literature scan: search PubMed for new publications on a
//! list of topics, skip anything already recorded, extract structured fields
//! from each new abstract with Gemini, compare the batch in one synthesis
//! pass, and write one row per publication into a Notion database.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐
//! │ Queries  │──▶│  PubMed  │──▶│ Analyze  │──▶│ Synthesize │──▶│ Publish  │
//! │ CLI/env/ │   │ esearch+ │   │ per item │   │ once/batch │   │  Notion  │
//! │  file    │   │  efetch  │   │ (Gemini) │   │  (Gemini)  │   │  pages   │
//! └──────────┘   └────┬─────┘   └──────────┘   └────────────┘   └──────────┘
//!                     │ filtered against
//!                ┌────┴──────────┐
//!                │  known URLs   │◀── Notion database query (once per run)
//!                └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=... NOTION_TOKEN=... NOTION_DATABASE_ID=...
//! litscan                               # topics from keywords.txt
//! litscan "metformin aging;sleep memory" # topics from the command line
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`queries`] | Keyword source resolution |
//! | [`traits`] | Service seams for search, inference and storage |
//! | [`pubmed`] | PubMed E-utilities client |
//! | [`inference`] | Gemini client and JSON payload parsing |
//! | [`analyze`] | Per-item field extraction |
//! | [`synthesize`] | Batch cross-item synthesis |
//! | [`notion`] | Notion database client |
//! | [`publish`] | Record property mapping |
//! | [`scan`] | Run orchestration |

pub mod analyze;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod notion;
pub mod publish;
pub mod pubmed;
pub mod queries;
pub mod scan;
pub mod synthesize;
pub mod traits;
