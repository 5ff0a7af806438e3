use std::time::Duration;

/// Typed error hierarchy for relay operations.
///
/// `Unauthenticated` is the only class surfaced to the caller as a hard
/// error; every upstream class is recovered locally by substituting its
/// `fallback_text()`, so the interactive experience degrades instead of
/// breaking the request/response cycle.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RelayError {
    // Surfaced to the caller
    #[error("not logged in")]
    Unauthenticated,

    // Recovered with fallback text
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("upstream error {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("network error: {0}")]
    Network(String),

    // Local failures (payload construction, store I/O)
    #[error("resource error: {0}")]
    Resource(String),
}

impl RelayError {
    /// Whether this is an upstream-API failure class, recoverable by
    /// substituting fallback text.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::UpstreamStatus { .. } | Self::Malformed(_) | Self::Network(_)
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Timeout(_) => "timeout",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::Malformed(_) => "malformed",
            Self::Network(_) => "network",
            Self::Resource(_) => "resource",
        }
    }

    /// The fixed user-visible string substituted for this failure.
    /// Never includes the raw upstream error.
    pub fn fallback_text(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Error 401: not logged in.",
            Self::Timeout(_) => "Error 504: the assistant timed out.",
            Self::UpstreamStatus { .. } | Self::Malformed(_) | Self::Network(_) | Self::Resource(_) => {
                "Error 500: something went wrong."
            }
        }
    }

    /// Classify an HTTP status code from the upstream API.
    pub fn from_status(status: u16, body: String) -> Self {
        Self::UpstreamStatus { status, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_classification() {
        assert!(RelayError::Timeout(Duration::from_secs(10)).is_upstream());
        assert!(RelayError::UpstreamStatus { status: 500, body: "err".into() }.is_upstream());
        assert!(RelayError::Malformed("no choices".into()).is_upstream());
        assert!(RelayError::Network("tcp reset".into()).is_upstream());
        assert!(!RelayError::Unauthenticated.is_upstream());
        assert!(!RelayError::Resource("disk".into()).is_upstream());
    }

    #[test]
    fn fallback_identifies_failure_class() {
        let timeout = RelayError::Timeout(Duration::from_secs(5));
        assert!(timeout.fallback_text().contains("504"));

        let upstream = RelayError::from_status(503, "unavailable".into());
        assert_eq!(upstream.fallback_text(), "Error 500: something went wrong.");
    }

    #[test]
    fn fallback_never_leaks_upstream_body() {
        let e = RelayError::from_status(500, "secret internal trace".into());
        assert!(!e.fallback_text().contains("secret"));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(RelayError::Unauthenticated.error_kind(), "unauthenticated");
        assert_eq!(RelayError::Timeout(Duration::from_secs(1)).error_kind(), "timeout");
        assert_eq!(RelayError::Network("x".into()).error_kind(), "network");
    }
}
