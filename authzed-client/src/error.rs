use reqwest::StatusCode;

/// Errors that can happen within the authzed-client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error emitted from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// The service answered with a non-success status code.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The HTTP status returned by the service.
        status: StatusCode,
        /// The response body, for diagnostics.
        body: String,
    },
    /// Errors (de)serializing request or response payloads.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Error when URL manipulation fails.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Invalid header value, such as a token containing control characters.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

impl Error {
    /// Returns the HTTP status code if the service answered with an error status.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Reqwest(err) => err.status(),
            _ => None,
        }
    }
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
