//! Error taxonomy for a scan run.
//!
//! Only [`ScanError::Configuration`] is fatal. Every other variant is caught
//! by the orchestrator at the narrowest scope (one query, one item, or the
//! synthesis pass), logged, and the run continues.

use thiserror::Error;

/// Result type for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Error)]
pub enum ScanError {
    /// No usable queries, missing credentials, or an invalid config file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reading the existing records from the database failed.
    #[error("could not fetch existing URLs: {0}")]
    DedupFetch(String),

    /// Either phase of the literature search failed for one query.
    #[error("fetch failed for query '{query}': {message}")]
    Fetch { query: String, message: String },

    /// The inference API answered, but not with a usable analysis object.
    #[error("analysis response did not parse: {0}")]
    AnalysisParse(String),

    /// The inference API answered, but not with a usable synthesis object.
    #[error("synthesis response did not parse: {0}")]
    SynthesisParse(String),

    /// Creating a record in the database failed.
    #[error("publish failed with status {status}: {message}")]
    Publish { status: u16, message: String },

    /// The inference API call itself failed.
    #[error("inference API error: {0}")]
    Inference(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_error_carries_status() {
        let err = ScanError::Publish {
            status: 400,
            message: "bad".into(),
        };
        assert_eq!(err.to_string(), "publish failed with status 400: bad");
    }

    #[test]
    fn fetch_error_names_the_query() {
        let err = ScanError::Fetch {
            query: "sleep apnea".into(),
            message: "status 429".into(),
        };
        assert_eq!(
            err.to_string(),
            "fetch failed for query 'sleep apnea': status 429"
        );
    }
}
