//! Error types shared across EPG crates.
//!
//! These errors represent failures in the transport and archive stages of an ingestion run,
//! before any guide content is interpreted. Service-specific errors are defined in the
//! server crate and wrap `CommonError` via `#[from]`.
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("feed returned non-success status {status}")]
    Status { status: StatusCode },

    #[error("failed to write download: {0}")]
    Download(#[source] std::io::Error),

    #[error("malformed compressed input: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommonError {
    /// Whether this error belongs to the fetch stage (transport or download write).
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            CommonError::Request(_) | CommonError::Status { .. } | CommonError::Download(_)
        )
    }

    /// Whether another attempt at the same request might succeed.
    ///
    /// Timeouts, connection and body failures, 429 and 5xx count. Local write and archive
    /// failures never do.
    pub fn is_transient(&self) -> bool {
        match self {
            CommonError::Request(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            CommonError::Status { status } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            CommonError::Download(_) | CommonError::Decompress(_) | CommonError::Io(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_throttling_and_server_statuses_are_transient() {
        let status = |code: u16| CommonError::Status {
            status: StatusCode::from_u16(code).unwrap(),
        };
        assert!(status(429).is_transient());
        assert!(status(502).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
    }

    #[test]
    fn local_failures_are_not_transient() {
        let io = || std::io::Error::other("disk");
        assert!(!CommonError::Download(io()).is_transient());
        assert!(!CommonError::Decompress(io()).is_transient());
        assert!(!CommonError::Io(io()).is_transient());
        assert!(CommonError::Download(io()).is_fetch());
        assert!(!CommonError::Io(io()).is_fetch());
    }
}
