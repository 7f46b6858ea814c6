//! Failure classification for relayed calls

use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;

/// Outcome of a relayed call that did not succeed
///
/// Callers react per kind: `Unauthorized` sends the browser to login,
/// `RequestFailed` surfaces an error to the page, `Unreachable` is transient
/// and left to the caller's retry policy.
///
/// `Clone` so a single outcome can be shared by every caller collapsed onto
/// one in-flight request.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Upstream answered 401
    #[error("UNAUTHORIZED")]
    Unauthorized,

    /// Upstream answered any other non-2xx status
    #[error("Request to {path} failed with status {status}")]
    RequestFailed { path: String, status: StatusCode },

    /// No status at all: DNS, connection refused, timeout
    #[error("Upstream unreachable: {0}")]
    Unreachable(#[source] Arc<reqwest::Error>),

    /// 2xx whose body does not carry what the contract promises
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// The outbound request could not be built
    #[error("Invalid relay request: {0}")]
    InvalidRequest(String),
}

impl RelayError {
    /// HTTP status for the classified kinds
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RelayError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            RelayError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RelayError::Unauthorized)
    }

    /// Label used for metrics
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            RelayError::Unauthorized => "unauthorized",
            RelayError::RequestFailed { .. } => "request_failed",
            RelayError::Unreachable(_) => "unreachable",
            RelayError::MalformedUpstreamResponse(_) => "malformed_upstream_response",
            RelayError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Unreachable(Arc::new(err))
    }
}
