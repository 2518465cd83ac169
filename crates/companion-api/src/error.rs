//! Error types for the HTTP API.
//!
//! [`ApiError`] converts into an Axum response with a JSON body:
//!
//! ```json
//! { "error": "pet already hatched", "kind": "invalid_state", "status": 409 }
//! ```
//!
//! | Kind | Status |
//! |------|--------|
//! | `not_found` | 404 |
//! | `invalid_state` | 409 |
//! | `invalid` | 422 |
//! | `vendor` | 502 |
//! | `timeout` | 504 |
//! | `internal` | 500 |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use companion_core::{CompanionError, ErrorKind};

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An engine operation failed.
    #[error(transparent)]
    Companion(#[from] CompanionError),

    /// A UUID could not be parsed from the request path.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
}

impl ApiError {
    /// The classification reported in the response body.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Companion(err) => err.kind(),
            Self::InvalidUuid(_) => ErrorKind::Invalid,
        }
    }
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Vendor => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": kind.as_str(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
