//! Error types for provider API calls.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors from the LLM / speech-to-text provider endpoints.
///
/// Note that a 429 here is the *provider's* own limiter disagreeing with our
/// counter (clock skew, other tenants); it is transient I/O, not a quota
/// denial, and is retried at this layer rather than slept on.
#[derive(Error, Debug, Clone)]
pub enum ProviderApiError {
    /// Malformed request body or parameters (400)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed (401)
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Valid API key but insufficient permissions (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown deployment or route (404)
    #[error("Resource not found")]
    NotFound,

    /// The provider's own rate limiter pushed back (429)
    #[error("Provider rate limit exceeded")]
    RateLimited,

    /// Transient server-side error (500, 502, 503, 504, 529)
    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    /// Connection failed, timeout, etc.
    #[error("Network error: {0}")]
    Network(String),

    /// Unexpected status code
    #[error("Unknown error ({0}): {1}")]
    Unknown(StatusCode, String),

    /// 2xx response whose body could not be decoded
    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderApiError {
    /// Create an error from HTTP status code and response body
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => Self::InvalidRequest(body),
            401 => Self::InvalidApiKey,
            403 => Self::Forbidden(body),
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500 | 502 | 503 | 504 | 529 => Self::ServerError(status, body),
            _ => Self::Unknown(status, body),
        }
    }

    /// Check if the error is transient and should be retried
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError(_, _) | Self::Network(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub const fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_400() {
        let error = ProviderApiError::from_status(StatusCode::BAD_REQUEST, "bad".to_string());
        assert!(matches!(error, ProviderApiError::InvalidRequest(_)));
        assert!(!error.is_transient());
    }

    #[test]
    fn test_from_status_401() {
        let error = ProviderApiError::from_status(StatusCode::UNAUTHORIZED, String::new());
        assert!(matches!(error, ProviderApiError::InvalidApiKey));
        assert!(error.is_permanent());
    }

    #[test]
    fn test_from_status_429_is_transient() {
        let error = ProviderApiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(error, ProviderApiError::RateLimited));
        assert!(error.is_transient());
    }

    #[test]
    fn test_from_status_5xx_is_transient() {
        for code in [500u16, 502, 503, 504, 529] {
            let status = StatusCode::from_u16(code).unwrap();
            let error = ProviderApiError::from_status(status, "overloaded".to_string());
            assert!(matches!(error, ProviderApiError::ServerError(_, _)));
            assert!(error.is_transient(), "status {code}");
        }
    }

    #[test]
    fn test_network_error_is_transient() {
        assert!(ProviderApiError::Network("reset".to_string()).is_transient());
        assert!(!ProviderApiError::Decode("truncated".to_string()).is_transient());
    }
}
