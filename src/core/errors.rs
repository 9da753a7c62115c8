use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API request {method} {path} failed with status {status}: {body}")]
    ApiError {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response: {0}")]
    ResponseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        PlatformError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            PlatformError::ResponseError(error.to_string())
        } else {
            PlatformError::ConnectionError(error.to_string())
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
