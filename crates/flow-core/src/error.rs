//! # Flow Errors
//!
//! Every failure on the flow query path carries its kind and the HTTP status
//! it should surface as. Transport concerns stay out: the status is a plain
//! `u16` and the hub decides how to write it.

use thiserror::Error;

pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL_ERROR: u16 = 500;
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;
pub const STATUS_GATEWAY_TIMEOUT: u16 = 504;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// The `filters` parameter is not a valid URL-escaped string.
    #[error("{0}")]
    Decoding(String),

    /// `timeRange` or `limit` is not a valid integer.
    #[error("{0}")]
    Parse(String),

    /// A filter group was rejected while building the Loki query.
    #[error("{0}")]
    QueryBuild(String),

    /// The backend call failed; `status` is what the backend (or the
    /// transport) reported.
    #[error("{message}")]
    BackendFetch { status: u16, message: String },
}

impl FlowError {
    /// HTTP status this error should be reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Decoding(_) | Self::Parse(_) | Self::QueryBuild(_) => STATUS_BAD_REQUEST,
            Self::BackendFetch { status, .. } => *status,
        }
    }

    /// Prepends `prefix` to the message, keeping kind and status.
    pub fn context(self, prefix: &str) -> Self {
        match self {
            Self::Decoding(m) => Self::Decoding(format!("{prefix}{m}")),
            Self::Parse(m) => Self::Parse(format!("{prefix}{m}")),
            Self::QueryBuild(m) => Self::QueryBuild(format!("{prefix}{m}")),
            Self::BackendFetch { status, message } => Self::BackendFetch {
                status,
                message: format!("{prefix}{message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        assert_eq!(FlowError::Decoding("x".into()).status_code(), 400);
        assert_eq!(FlowError::Parse("x".into()).status_code(), 400);
        assert_eq!(FlowError::QueryBuild("x".into()).status_code(), 400);
    }

    #[test]
    fn test_backend_error_keeps_reported_status() {
        let err = FlowError::BackendFetch {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_context_prefixes_message_and_keeps_status() {
        let err = FlowError::BackendFetch {
            status: 503,
            message: "connection refused".into(),
        }
        .context("Error while fetching flows from Loki: ");
        assert_eq!(err.status_code(), 503);
        assert_eq!(
            err.to_string(),
            "Error while fetching flows from Loki: connection refused"
        );
    }
}
