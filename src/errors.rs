use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Invalid server domain: {url}")]
    InvalidDomain { url: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_domain(url: &str) -> Self {
        Self::InvalidDomain {
            url: url.to_string(),
        }
    }
}

/// Reasons a share payload cannot be turned into uploadables.
///
/// Both abort the whole batch before any request is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed share payload: {reason}")]
    Malformed { reason: String },

    #[error("Shared reference has no usable name: {locator}")]
    InvalidReference { locator: String },
}

impl ParseError {
    pub fn malformed(reason: &str) -> Self {
        Self::Malformed {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_reference(locator: &str) -> Self {
        Self::InvalidReference {
            locator: locator.to_string(),
        }
    }
}

/// Terminal failure of a single upload. Never fatal to sibling uploads.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UploadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload timed out")]
    Timeout,

    #[error("Server rejected upload with status {code}")]
    ServerRejected { code: u16 },

    #[error("Local IO error: {0}")]
    LocalIo(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network(_) | UploadError::Timeout => true,
            UploadError::ServerRejected { code } => should_retry_status(*code),
            UploadError::LocalIo(_) | UploadError::Cancelled | UploadError::Internal(_) => false,
        }
    }
}

pub fn should_retry_status(status_code: u16) -> bool {
    matches!(status_code, 408 | 429 | 500 | 502 | 503 | 504)
}
