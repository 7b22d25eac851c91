//! Service-level error taxonomy

use fitappraisal::AppraisalError;
use fitesi::EsiError;
use fitstore::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Fitting absent locally or remotely
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid or expired credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Upstream kept answering 429 after the bounded retries
    #[error("Upstream rate limit exceeded")]
    RateLimited { retry_after_seconds: Option<u64> },

    /// Local sync throttle refused the call
    #[error("Sync throttled, retry in {retry_after_seconds}s")]
    Throttled { retry_after_seconds: u64 },

    /// Malformed appraisal or remote response
    #[error("Invalid upstream response: {0}")]
    UpstreamInvalid(String),

    /// Primary storage failed (not a missing key)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any other upstream or configuration failure
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// HTTP status a route layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::Unauthorized(_) => 401,
            ServiceError::RateLimited { .. } => 503,
            ServiceError::Throttled { .. } => 429,
            ServiceError::UpstreamInvalid(_) => 502,
            ServiceError::InvalidInput(_) => 400,
            ServiceError::StorageUnavailable(_) | ServiceError::Other(_) => 500,
        }
    }

    /// Seconds a client should wait before retrying, when known
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            ServiceError::RateLimited {
                retry_after_seconds,
            } => *retry_after_seconds,
            ServiceError::Throttled {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl From<EsiError> for ServiceError {
    fn from(err: EsiError) -> Self {
        match err {
            EsiError::Unauthorized(msg) => ServiceError::Unauthorized(msg),
            EsiError::NotFound(msg) => ServiceError::NotFound(msg),
            EsiError::RateLimited {
                retry_after_seconds,
            } => ServiceError::RateLimited {
                retry_after_seconds,
            },
            EsiError::JsonParse(e) => ServiceError::UpstreamInvalid(e.to_string()),
            other => ServiceError::Other(other.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            StoreError::InvalidPath(segment) => {
                ServiceError::InvalidInput(format!("invalid path segment {:?}", segment))
            }
            other => ServiceError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<AppraisalError> for ServiceError {
    fn from(err: AppraisalError) -> Self {
        match err {
            AppraisalError::UpstreamInvalid(msg) => ServiceError::UpstreamInvalid(msg),
            AppraisalError::ApiError { code: 429, .. } => ServiceError::RateLimited {
                retry_after_seconds: None,
            },
            other => ServiceError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServiceError::from(EsiError::from_status_code(403, "expired")).status_code(),
            401
        );
        assert_eq!(
            ServiceError::from(EsiError::from_status_code(429, "")).status_code(),
            503
        );
        assert_eq!(
            ServiceError::from(StoreError::NotFound("x".into())).status_code(),
            404
        );
        assert_eq!(
            ServiceError::from(StoreError::Unavailable("disk".into())).status_code(),
            500
        );
        assert_eq!(
            ServiceError::Throttled {
                retry_after_seconds: 12
            }
            .status_code(),
            429
        );
        assert_eq!(
            ServiceError::from(AppraisalError::UpstreamInvalid("no total".into())).status_code(),
            502
        );
    }
}
