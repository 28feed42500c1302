//! HTTP mapping for crate errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::Error;

impl Error {
    /// Status code for a response that has not started yet
    pub fn status_code(&self) -> StatusCode {
        match self {
            e if e.is_conflict() => StatusCode::CONFLICT,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{SegmentError, WorkerError};
    use crate::registry::{RegistryError, SessionKey};

    fn key() -> SessionKey {
        SessionKey::parse("k").unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::from(RegistryError::SessionConflict(key())), StatusCode::CONFLICT),
            (Error::from(RegistryError::SessionNotFound(key())), StatusCode::NOT_FOUND),
            (
                Error::from(RegistryError::WaitTimedOut {
                    key: key(),
                    waited: Duration::from_secs(1),
                }),
                StatusCode::NOT_FOUND,
            ),
            (Error::from(RegistryError::InvalidKey("../x".into())), StatusCode::NOT_FOUND),
            (Error::from(SegmentError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (Error::BadRequest("bad mode".into()), StatusCode::BAD_REQUEST),
            (
                Error::from(WorkerError::Spawn {
                    program: "ffmpeg".into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn test_into_response() {
        let response = Error::from(RegistryError::SessionConflict(key())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
