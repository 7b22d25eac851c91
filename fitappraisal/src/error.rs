//! Error handling for appraisals

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppraisalError>;

#[derive(Error, Debug)]
pub enum AppraisalError {
    /// Missing API key or bad settings
    #[error("Appraisal configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered, but without a usable total
    #[error("Invalid appraisal response: {0}")]
    UpstreamInvalid(String),

    #[error("Appraisal service error (code {code}): {message}")]
    ApiError { code: u16, message: String },
}

impl AppraisalError {
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
        }
    }
}
