use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("CONFIGURATION: {0}")]
    Configuration(String),
    #[error("AUTHENTICATION: {0}")]
    Authentication(String),
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("SERIALIZATION: {0}")]
    Serialization(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("TRANSIENT_STORE: {0}")]
    TransientStore(String),
    #[error("HTTP_FAILURE: {0}")]
    Http(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
