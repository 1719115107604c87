use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use sealbox_core::CryptoError;

/// Server-level error type covering all subsystems.
#[derive(Error, Debug)]
pub enum ServerError {
    // Validation failures, surfaced as 4xx with a readable message.
    #[error("empty text and file fields")]
    EmptyBody,
    #[error("empty password")]
    EmptyPassword,
    #[error("bad key")]
    BadKey,
    #[error("incorrect TTL")]
    BadTtl,
    #[error("incorrect times")]
    BadTimes,
    #[error("file is too large")]
    FileTooLarge,

    /// Item does not exist, has expired, or is exhausted. One answer for all
    /// three so a caller cannot probe which it was.
    #[error("not found")]
    NotFound,
    /// Verifier mismatch for the supplied password.
    #[error("failed password or key")]
    WrongSecret,
    /// Another reader consumed the last budget first.
    #[error("no attempts left")]
    NoAttempts,
    /// Counter update raced with the reaper.
    #[error("decrement affected no row")]
    DecrementFailed,
    /// The row names a blob that is not on disk.
    #[error("stored file is missing")]
    BlobMissing,
    /// The requested item has no file aspect.
    #[error("no file content")]
    NoFile,

    #[error("storage is full")]
    StorageFull,
    #[error("blob create failed: {0}")]
    BlobCreateFailed(String),

    #[error("database error: {0}")]
    Database(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status for this error, shared by the JSON and HTML renderings.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::EmptyBody
            | ServerError::EmptyPassword
            | ServerError::BadKey
            | ServerError::BadTtl
            | ServerError::BadTimes
            | ServerError::FileTooLarge
            | ServerError::WrongSecret => StatusCode::BAD_REQUEST,
            ServerError::NotFound | ServerError::NoAttempts | ServerError::DecrementFailed => {
                StatusCode::NOT_FOUND
            }
            ServerError::NoFile => StatusCode::NO_CONTENT,
            ServerError::StorageFull => StatusCode::INSUFFICIENT_STORAGE,
            ServerError::BlobCreateFailed(_)
            | ServerError::BlobMissing
            | ServerError::Database(_)
            | ServerError::Io(_)
            | ServerError::Crypto(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a client. Races and internals are collapsed
    /// to the generic wording.
    pub fn public_message(&self) -> &'static str {
        match self {
            ServerError::EmptyBody => "empty text and file fields",
            ServerError::EmptyPassword => "empty password",
            ServerError::BadKey => "bad key",
            ServerError::BadTtl => "incorrect TTL",
            ServerError::BadTimes => "incorrect times",
            ServerError::FileTooLarge => "file is too large",
            ServerError::WrongSecret => "failed password or key",
            ServerError::NotFound | ServerError::NoAttempts | ServerError::DecrementFailed => {
                "not found"
            }
            ServerError::NoFile => "no file content",
            ServerError::StorageFull => "storage is full",
            _ => "internal error",
        }
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::WrongSecret => ServerError::WrongSecret,
            other => ServerError::Crypto(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        ServerError::Database(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }
        let body = json!({ "error": self.public_message() });
        (status, axum::Json(body)).into_response()
    }
}

/// Convenience alias for server results.
pub type Result<T> = std::result::Result<T, ServerError>;
