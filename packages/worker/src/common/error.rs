//! Error types for the external-source fetch path.

use thiserror::Error;

/// A failure while fetching a page from the external listing source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// All fetch failures are connectivity-shaped and worth retrying,
    /// except a client-error status, which redelivery cannot fix. Two
    /// client errors are carved out: 429 (throttling) and 403 (bot
    /// detection), both of which clear up on their own.
    pub fn is_transient(&self) -> bool {
        use reqwest::StatusCode;

        match self {
            FetchError::Request { .. } | FetchError::Body { .. } => true,
            FetchError::Status { status, .. } => {
                !status.is_client_error()
                    || matches!(
                        *status,
                        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN
                    )
            }
        }
    }
}
