//! Offload error definitions.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Boxed error returned by an [`OffloadClient`](super::executor::OffloadClient).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while offloading a backend response.
#[derive(Debug, Error)]
pub enum OffloadError {
    /// The method header is missing or names a verb other than GET, POST or HEAD.
    #[error("unsupported verb")]
    InvalidVerb,

    /// The URL header is missing or empty.
    #[error("missing url")]
    MissingUrl,

    /// The offload request could not be formed (e.g. malformed URL).
    #[error("failed to build offload request: {0}")]
    Build(#[from] axum::http::Error),

    /// The offload target could not be reached or the exchange failed.
    #[error("offload request failed: {0}")]
    Transport(#[source] BoxError),

    /// No response headers arrived from the offload target in time.
    #[error("offload request timed out after {0:?}")]
    Timeout(Duration),
}

impl OffloadError {
    /// True for failures raised while talking to the offload target.
    pub fn is_transport(&self) -> bool {
        matches!(self, OffloadError::Transport(_) | OffloadError::Timeout(_))
    }

    /// Status the host should answer with instead of the backend response.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OffloadError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label used for the `outcome` metric.
    pub fn label(&self) -> &'static str {
        match self {
            OffloadError::InvalidVerb => "invalid_verb",
            OffloadError::MissingUrl => "missing_url",
            OffloadError::Build(_) => "build_error",
            OffloadError::Transport(_) => "transport_error",
            OffloadError::Timeout(_) => "timeout",
        }
    }
}
