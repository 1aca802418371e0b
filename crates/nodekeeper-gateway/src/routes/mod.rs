//! HTTP handlers.
//!
//! Handlers validate input, then read or write the state files the
//! supervisor shares with us. Protection comes from the guard extractors
//! in their argument lists.

pub mod account;
pub mod apps;
pub mod system;

use axum::{
    Json,
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use nodekeeper_core::{DiskError, ValidationError};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::auth::AuthError;

/// Handler errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication or authorization failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A field failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request body is malformed.
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    /// The operation clashes with one already running.
    #[error("{0}")]
    Conflict(&'static str),

    /// Reading or writing a state file failed.
    #[error("{message}")]
    Operation {
        /// Message returned to the client.
        message: &'static str,
        /// Underlying failure, logged only.
        #[source]
        source: DiskError,
    },
}

impl ApiError {
    /// Wrap a disk failure with a client-facing message.
    #[must_use]
    pub const fn operation(message: &'static str, source: DiskError) -> Self {
        Self::Operation { message, source }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidInput(errors.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            Self::Auth(e) => return e.into_response(),
            Self::Validation(_) | Self::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, "invalid_input")
            }
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Operation { ref source, .. } => {
                tracing::error!(error = %source, "{self}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorBody {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

/// Parse an optional JSON body; an empty body yields the default.
///
/// # Errors
///
/// Returns `InvalidInput` if the body is present but not valid JSON for `T`.
pub fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidInput(e.to_string()))
}

/// `GET /ping`
pub async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": format!("nodekeeper-{}", env!("CARGO_PKG_VERSION")),
    }))
}
