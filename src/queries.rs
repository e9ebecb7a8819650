//! Query source resolution.
//!
//! The active keyword list comes from the first source that yields at least
//! one query:
//!
//! 1. the run-time override (CLI argument, `;`-separated)
//! 2. the environment override (`KEYWORDS`, `;`-separated)
//! 3. the keyword file, one query per line, `#` comments and blank lines skipped

use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::models::Query;

/// Where the active queries came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    RunTime,
    Environment,
    File,
}

impl std::fmt::Display for QuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuerySource::RunTime => f.write_str("run-time override"),
            QuerySource::Environment => f.write_str("environment override"),
            QuerySource::File => f.write_str("keyword file"),
        }
    }
}

/// Resolve the ordered, non-empty query list.
///
/// A source that is present but contains only separators or whitespace
/// falls through to the next one.
pub fn resolve_queries(
    run_time: Option<&str>,
    env_override: Option<&str>,
    keyword_file: &Path,
) -> Result<(QuerySource, Vec<Query>)> {
    if let Some(raw) = run_time {
        let queries = split_keywords(raw);
        if !queries.is_empty() {
            return Ok(resolved(QuerySource::RunTime, queries));
        }
        debug!("run-time keyword override is empty, ignoring");
    }

    if let Some(raw) = env_override {
        let queries = split_keywords(raw);
        if !queries.is_empty() {
            return Ok(resolved(QuerySource::Environment, queries));
        }
        debug!("environment keyword override is empty, ignoring");
    }

    let content = match std::fs::read_to_string(keyword_file) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::Configuration(format!(
                "no keywords given and keyword file {} does not exist",
                keyword_file.display()
            )));
        }
        Err(e) => {
            return Err(ScanError::Configuration(format!(
                "failed to read keyword file {}: {}",
                keyword_file.display(),
                e
            )));
        }
    };

    let queries = parse_keyword_file(&content);
    if queries.is_empty() {
        return Err(ScanError::Configuration(format!(
            "keyword file {} contains no queries",
            keyword_file.display()
        )));
    }
    Ok(resolved(QuerySource::File, queries))
}

fn resolved(source: QuerySource, queries: Vec<Query>) -> (QuerySource, Vec<Query>) {
    info!(source = %source, count = queries.len(), "resolved queries");
    (source, queries)
}

/// Split a `;`-separated keyword string into queries.
pub fn split_keywords(raw: &str) -> Vec<Query> {
    raw.split(';').filter_map(Query::new).collect()
}

/// Parse a line-oriented keyword file.
pub fn parse_keyword_file(content: &str) -> Vec<Query> {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(Query::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn strings(queries: &[Query]) -> Vec<&str> {
        queries.iter().map(|q| q.as_str()).collect()
    }

    fn keyword_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn split_trims_and_drops_empty_segments() {
        let q = split_keywords(" sleep apnea ;; ; CPAP adherence;");
        assert_eq!(strings(&q), vec!["sleep apnea", "CPAP adherence"]);
    }

    #[test]
    fn file_skips_comments_and_blank_lines() {
        let q = parse_keyword_file("# topics\n\nmetformin aging\n   \n  # indented comment\n GLP-1 \n");
        assert_eq!(strings(&q), vec!["metformin aging", "GLP-1"]);
    }

    #[test]
    fn file_of_only_comments_yields_nothing() {
        assert!(parse_keyword_file("# a\n\n# b\n").is_empty());
    }

    #[test]
    fn run_time_wins_over_env_and_file() {
        let f = keyword_file("from file\n");
        let (source, q) = resolve_queries(Some("cli a;cli b"), Some("env"), f.path()).unwrap();
        assert_eq!(source, QuerySource::RunTime);
        assert_eq!(strings(&q), vec!["cli a", "cli b"]);
    }

    #[test]
    fn env_wins_over_file() {
        let f = keyword_file("from file\n");
        let (source, q) = resolve_queries(None, Some("env a; env b"), f.path()).unwrap();
        assert_eq!(source, QuerySource::Environment);
        assert_eq!(strings(&q), vec!["env a", "env b"]);
    }

    #[test]
    fn blank_override_falls_through() {
        let f = keyword_file("from file\n");
        let (source, q) = resolve_queries(Some(" ; "), Some(""), f.path()).unwrap();
        assert_eq!(source, QuerySource::File);
        assert_eq!(strings(&q), vec!["from file"]);
    }

    #[test]
    fn no_source_is_a_configuration_error() {
        let f = keyword_file("# nothing here\n\n");
        let err = resolve_queries(None, None, f.path()).unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));

        let err = resolve_queries(None, None, Path::new("/nonexistent/keywords.txt")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
