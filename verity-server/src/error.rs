use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use verity_common::VerityError;

/// Message returned for every failure whose detail must stay server side.
pub const GENERIC_ERROR: &str = "Sorry, I encountered an error. Please try again.";

/// Error body sent to the caller: `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::BAD_REQUEST,
        }
    }

    pub fn internal() -> Self {
        Self {
            message: GENERIC_ERROR.to_string(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Client-caused failures keep their message, everything else collapses to
/// [`GENERIC_ERROR`].
impl From<&VerityError> for ApiError {
    fn from(err: &VerityError) -> Self {
        match err {
            VerityError::InputMissing | VerityError::ContentFlagged => {
                ApiError::bad_request(err.to_string())
            }
            _ => ApiError::internal(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let api = ApiError::from(&VerityError::InputMissing);
        assert_eq!(api.status_code, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "No input provided");

        let api = ApiError::from(&VerityError::ContentFlagged);
        assert_eq!(api.status_code, StatusCode::BAD_REQUEST);
        assert!(api.message.starts_with("The input was flagged"));
    }

    #[test]
    fn upstream_detail_is_hidden() {
        for err in [
            VerityError::Upstream("gemini: 401 bad key sk-123".into()),
            VerityError::Timeout,
            VerityError::Config("missing".into()),
            VerityError::Internal(anyhow::anyhow!("boom")),
        ] {
            let api = ApiError::from(&err);
            assert_eq!(api.status_code, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(api.message, GENERIC_ERROR);
        }
    }
}
