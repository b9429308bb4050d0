//! Errors raised while fetching the earthquake feed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error fetching earthquake feed: {0}")]
    Network(String),

    #[error("Earthquake feed returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Failed to parse earthquake feed: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Parse(e.to_string())
    }
}
