//! Error types for platform operations

use thiserror::Error;

/// Errors raised while talking to the community platform
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials rejected or token expired
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Too many requests
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Unexpected HTTP status
    #[error("Request to {endpoint} failed with status {status}")]
    Status { status: u16, endpoint: String },

    /// The response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The API accepted the request but reported errors in the body
    #[error("API error: {0}")]
    Api(String),
}

impl From<serde_json::Error> for PlatformError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidResponse(error.to_string())
    }
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PlatformError::RateLimited { retry_after: 30 };
        assert_eq!(error.to_string(), "Rate limited, retry after 30 seconds");

        let error = PlatformError::Status {
            status: 500,
            endpoint: "/api/remove".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Request to /api/remove failed with status 500"
        );

        let error = PlatformError::NotFound("t3_abc".to_string());
        assert_eq!(error.to_string(), "Not found: t3_abc");
    }

    #[test]
    fn test_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = PlatformError::from(json_error);
        assert!(matches!(error, PlatformError::InvalidResponse(_)));
    }
}
