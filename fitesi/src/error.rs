//! Error handling for the ESI client

use thiserror::Error;

/// Result type for fitesi
pub type Result<T> = std::result::Result<T, EsiError>;

/// Errors returned by the ESI client
#[derive(Error, Debug)]
pub enum EsiError {
    /// Invalid or expired credential (401/403)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Character, fitting or public record not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Upstream 429 that survived the bounded retries
    #[error("Rate limit exceeded (retry after {retry_after_seconds:?}s)")]
    RateLimited { retry_after_seconds: Option<u64> },

    /// Transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON body
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Missing client credentials or invalid settings
    #[error("ESI configuration error: {0}")]
    Configuration(String),

    /// Any other non-success status
    #[error("ESI error (code {code}): {message}")]
    ApiError { code: u16, message: String },
}

impl EsiError {
    /// Maps an HTTP status code and body to an error
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            401 | 403 => Self::Unauthorized(message.into()),
            404 => Self::NotFound(message.into()),
            429 => Self::RateLimited {
                retry_after_seconds: None,
            },
            _ => Self::ApiError {
                code,
                message: message.into(),
            },
        }
    }

    /// True for credential failures
    pub fn is_auth_error(&self) -> bool {
        matches!(self, EsiError::Unauthorized(_))
    }

    /// True for upstream rate limiting
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, EsiError::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(EsiError::from_status_code(403, "forbidden").is_auth_error());
        assert!(EsiError::from_status_code(429, "").is_rate_limit());
        assert!(matches!(
            EsiError::from_status_code(404, "gone"),
            EsiError::NotFound(_)
        ));
        assert!(matches!(
            EsiError::from_status_code(502, "bad gateway"),
            EsiError::ApiError { code: 502, .. }
        ));
    }
}
