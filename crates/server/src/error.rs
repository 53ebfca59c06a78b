//! Errors reported on the event stream.

use bloom_client::fetch::UrlError;
use bloom_core::Error;

/// Failures of a single input line. None of them stop the loop.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The line is not a valid event.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The event was valid but could not be completed.
    #[error(transparent)]
    Failed(#[from] Error),
}

impl From<serde_json::Error> for ServeError {
    fn from(err: serde_json::Error) -> Self {
        ServeError::InvalidInput(err.to_string())
    }
}

impl From<UrlError> for ServeError {
    fn from(err: UrlError) -> Self {
        ServeError::InvalidInput(err.to_string())
    }
}
