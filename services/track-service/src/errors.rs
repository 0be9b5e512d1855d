//!
//! src/errors.rs  Oct 18th, 2025
//!
//! Defines the closed set of failures the track service can produce,
//! their conversions, and how each one is shown to a caller
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("download error: {0}")]
    Download(String),
    #[error("storage error: {0}")]
    Storage(String),
    /// Storage error raised by the uniqueness constraint on a key
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl ServiceError {
    /// Status code the routing layer answers with for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::NotFound(_)   => 404,
            ServiceError::Auth(_)
            | ServiceError::Http(_)
            | ServiceError::Download(_) => 502,
            _ => 500
        }
    }

    /// Caller-facing message. Only 4xx kinds carry detail.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Validation(msg) => msg.clone(),
            ServiceError::NotFound(msg)   => msg.clone(),
            _ => "An internal server error occurred. Please try again later."
                .to_string()
        }
    }

    /// Failure classes a download attempt may be retried on
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Http(_) | ServiceError::Io(_) | ServiceError::Download(_)
        )
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ServiceError::Config(e.to_string())
        } else {
            ServiceError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self { ServiceError::Parse(e.to_string()) }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() =>
                ServiceError::Conflict(db.message().to_string()),
            _ => ServiceError::Storage(e.to_string())
        }
    }
}
