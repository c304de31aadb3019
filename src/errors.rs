use crate::{
    models::bucket::UnknownCannedAcl,
    services::bucket_service::{BucketError, ConflictCause},
};
use axum::{
    Json,
    extract::rejection::{BytesRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A wire-level error: HTTP status, S3-style error code, and message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, code, and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }

    /// Shortcut for 400 with a malformed request body.
    pub fn malformed_xml(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "MalformedXML", msg)
    }

    /// Shortcut for 400 with an unusable header or query value.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidArgument", msg)
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, "NotImplemented", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<BucketError> for AppError {
    fn from(err: BucketError) -> Self {
        let message = err.to_string();
        match err {
            BucketError::InvalidName { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, "InvalidBucketName", message)
            }
            BucketError::UnsupportedRegion(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "InvalidLocationConstraint", message)
            }
            BucketError::InvalidCursor => {
                AppError::new(StatusCode::BAD_REQUEST, "InvalidArgument", message)
            }
            BucketError::Conflict {
                cause: ConflictCause::Exists,
                ..
            } => AppError::new(StatusCode::CONFLICT, "BucketAlreadyExists", message),
            BucketError::Conflict {
                cause: ConflictCause::OwnedByCaller,
                ..
            } => AppError::new(StatusCode::CONFLICT, "BucketAlreadyOwnedByYou", message),
            BucketError::Conflict {
                cause: ConflictCause::InFlight(_),
                ..
            } => AppError::new(StatusCode::CONFLICT, "OperationAborted", message),
            BucketError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "NoSuchBucket", message)
            }
            BucketError::InvalidKey { .. } => AppError::invalid_argument(message),
            BucketError::ObjectNotFound { .. } => {
                AppError::new(StatusCode::NOT_FOUND, "NoSuchKey", message)
            }
            BucketError::NotEmpty(_) => {
                AppError::new(StatusCode::CONFLICT, "BucketNotEmpty", message)
            }
            BucketError::Io(_) => AppError::internal(message),
        }
    }
}

impl From<UnknownCannedAcl> for AppError {
    fn from(err: UnknownCannedAcl) -> Self {
        AppError::invalid_argument(err.to_string())
    }
}

// Extractor rejections answer in the same JSON shape as every other error.

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::invalid_argument(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, "InvalidURI", rejection.body_text())
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        let status = rejection.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "EntityTooLarge"
        } else {
            "IncompleteBody"
        };
        AppError::new(status, code, rejection.body_text())
    }
}
