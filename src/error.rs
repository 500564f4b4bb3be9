use reqwest::StatusCode;
use thiserror::Error;

/// Failure classes for talking to the booking service.
///
/// `Auth` routes to credential back-off, `Transport` and `RemoteStatus` to
/// bounded retry. `DataShape` means the remote contract broke; it is never
/// retried and bubbles up to the cycle restart.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication rejected or session expired")]
    Auth,
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote returned HTTP {0}")]
    RemoteStatus(StatusCode),
    #[error("unexpected response shape: {0}")]
    DataShape(String),
}

impl ApiError {
    /// Classify a non-success HTTP status. 401 means the token went stale.
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            ApiError::Auth
        } else {
            ApiError::RemoteStatus(status)
        }
    }
}
