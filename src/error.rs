//! Error types shared by the intake, identity and store layers, and their
//! mapping onto HTTP responses.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// A user-correctable problem with one submitted field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError {
            field,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,

    #[error("invalid authorization token")]
    InvalidToken,

    #[error("authorization token expired")]
    Expired,

    #[error("invalid username or password")]
    InvalidCredentials,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("username {0:?} is already taken")]
    DuplicateUser(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] mongodb::error::Error),

    #[error("stored record is unreadable: {0}")]
    Corrupt(String),
}

/// Anything a request handler can fail with.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("username {0:?} is already taken")]
    DuplicateUser(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUser(username) => AppError::DuplicateUser(username),
            other => AppError::Store(other),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::DuplicateUser(_) => StatusCode::CONFLICT,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Validation(err) => json!({ "error": err.message, "field": err.field }),
            AppError::Store(err) => {
                log::error!("{err}");
                json!({ "error": "internal storage error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_user_maps_to_conflict() {
        let err = AppError::from(StoreError::DuplicateUser("alice".to_string()));
        assert!(matches!(err, AppError::DuplicateUser(ref name) if name == "alice"));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn validation_error_names_the_field() {
        let err = AppError::from(ValidationError::new("amount", "must be positive"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "invalid amount: must be positive");
    }

    #[test]
    fn auth_errors_are_unauthorized() {
        let err = AppError::from(AuthError::Expired);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
