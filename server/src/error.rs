//! API error type and its HTTP mapping.
//!
//! | Variant           | Status | Body                              |
//! |-------------------|--------|-----------------------------------|
//! | `InvalidToken`    | 401    | `{"error": "Invalid token"}`      |
//! | `CommandNotFound` | 404    | `{"error": "Command not found"}`  |
//! | `MissingMessage`  | 400    | `{"error": "Missing log message"}`|
//! | `Database`        | 500    | `{"error": "Internal server error"}` |

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use doorlink::protocol::ErrorReply;
use tracing::error;

use crate::storage::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Token header absent or unknown.
    #[error("Invalid token")]
    InvalidToken,

    /// No pending command with that id belongs to the caller. Covers
    /// executed, expired, foreign, and unknown ids alike.
    #[error("Command not found")]
    CommandNotFound,

    #[error("Missing log message")]
    MissingMessage,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::CommandNotFound => StatusCode::NOT_FOUND,
            Self::MissingMessage => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Database(e) => {
                error!(error = %e, "Request failed on storage");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(ErrorReply::new(&message))).into_response()
    }
}
