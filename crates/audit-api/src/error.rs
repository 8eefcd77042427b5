use thiserror::Error;

/// Failure modes of the backend contract, translated once at the client
/// boundary so callers never look at raw responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response, body kept verbatim for display.
    #[error("HTTP {status} {reason} - {body}")]
    Status {
        status: u16,
        reason: &'static str,
        body: String,
    },
    /// Report token unknown or expired. Deliberately separate from
    /// [`ApiError::Status`]: the console shows a dedicated state for it.
    #[error("report not found")]
    NotFound,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid api base url `{0}`")]
    BaseUrl(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }
}
