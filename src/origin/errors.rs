//! Origin error types
//!
//! Maps HTTP status codes and transport failures from the origin API to
//! specific variants. None of them are retried here.

/// Origin fetch failure
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("Rate limited by origin")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),

    #[error("Origin API error ({code}): {info}")]
    Api { code: String, info: String },

    #[error("Malformed origin response: {0}")]
    Malformed(String),
}

impl OriginError {
    /// Create an OriginError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            403 => OriginError::Forbidden(body.to_string()),
            404 => OriginError::NotFound(body.to_string()),
            408 => OriginError::Timeout,
            429 => OriginError::RateLimited,
            500..=599 => OriginError::Server(status, body.to_string()),
            _ => OriginError::Request(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for OriginError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OriginError::Timeout
        } else if e.is_connect() || e.is_request() {
            OriginError::Network(e.to_string())
        } else if e.is_decode() {
            OriginError::Malformed(e.to_string())
        } else {
            OriginError::Request(e.to_string())
        }
    }
}
