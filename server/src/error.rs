use std::{fmt, io};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use kernel::ErrorReply;
use thiserror::Error;

const INTERNAL_ERROR: &str = "Internal server error";

/// Reason a login attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    UserNotFound,
    WrongPassword,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::UserNotFound => f.write_str("user not found"),
            AuthFailure::WrongPassword => f.write_str("wrong password"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("{0}")]
    AuthFailure(AuthFailure),
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("file not found")]
    NotFound,
    #[error("file exceeds the size limit")]
    PayloadTooLarge,
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateEmail => StatusCode::CONFLICT,
            ApiError::AuthFailure(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unauthenticated => StatusCode::SEE_OTHER,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the client.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Storage(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                INTERNAL_ERROR.to_owned()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Unauthenticated => return Redirect::to("/login").into_response(),
            ApiError::Storage(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                tracing::error!("{self}");
            }
            ApiError::Forbidden => tracing::warn!("access denied"),
            _ => tracing::debug!("request failed: {self}"),
        }
        let reply = ErrorReply {
            error: self.public_message(),
        };
        (self.status(), Json(reply)).into_response()
    }
}

/// Generic 500 reply used by the catch-all handlers.
pub fn internal_server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorReply {
            error: INTERNAL_ERROR.to_owned(),
        }),
    )
        .into_response()
}
