use thiserror::Error;

/// Result type alias for redirector operations
pub type Result<T, E = RedirectorError> = std::result::Result<T, E>;

/// Errors that can occur while handling a click. None of these reach the
/// browser as an error page; the service folds them into a redirect home.
#[derive(Error, Debug)]
pub enum RedirectorError {
    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Response serialization error: {0}")]
    ResponseSerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tracker error: {0}")]
    Tracker(#[from] tracker::TrackerError),
}
