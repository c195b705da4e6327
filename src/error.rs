//! Failure taxonomy for a conversion request.
//!
//! Every failure is terminal for the request. [`ConversionError`] implements
//! [`IntoResponse`], so the HTTP layer turns it into the JSON error body
//! `{"status":"error","message":...,"errorKind":...}` with a status code that
//! reflects the stage that failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::request::ConversionResult;
use crate::store::StoreError;

/// Machine-readable tag for the stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    BadRequest,
    SourceUnavailable,
    ParseFailure,
    TransformFailure,
    SimplifyFailure,
    SerializeFailure,
    SinkUnavailable,
    SigningFailure,
    Internal,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    /// A field is missing, has the wrong type, or holds an unusable value.
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("could not download '{key}': {source}")]
    SourceUnavailable {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("could not parse input: {0}")]
    ParseFailure(String),

    #[error("could not reproject dataset: {0}")]
    TransformFailure(String),

    #[error("could not simplify geometries: {0}")]
    SimplifyFailure(String),

    #[error("could not write output: {0}")]
    SerializeFailure(String),

    #[error("could not upload '{key}': {source}")]
    SinkUnavailable {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("could not sign download url for '{key}': {source}")]
    SigningFailure {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Local failures unrelated to the request itself (staging I/O, task panics).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::ParseFailure(_) => ErrorKind::ParseFailure,
            Self::TransformFailure(_) => ErrorKind::TransformFailure,
            Self::SimplifyFailure(_) => ErrorKind::SimplifyFailure,
            Self::SerializeFailure(_) => ErrorKind::SerializeFailure,
            Self::SinkUnavailable { .. } => ErrorKind::SinkUnavailable,
            Self::SigningFailure { .. } => ErrorKind::SigningFailure,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::SourceUnavailable {
                source: StoreError::NotFound(_),
                ..
            } => StatusCode::NOT_FOUND,
            Self::ParseFailure(_) | Self::TransformFailure(_) | Self::SerializeFailure(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::SourceUnavailable { .. }
            | Self::SinkUnavailable { .. }
            | Self::SigningFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::SimplifyFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ConversionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Internal(detail) => {
                error!(detail = %detail, "conversion failed with internal error");
                "internal server error".to_owned()
            }
            other if status.is_client_error() => {
                warn!(kind = ?other.kind(), error = %other, "conversion rejected");
                other.to_string()
            }
            other => {
                error!(kind = ?other.kind(), error = %other, "conversion failed");
                other.to_string()
            }
        };
        (status, Json(ConversionResult::error(message, self.kind()))).into_response()
    }
}
