//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::AuthError;
use crate::password::validate_password;

/// Longest accepted email address.
const MAX_EMAIL_LEN: usize = 254;

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let msg = e.to_string();
        match e {
            AuthError::DuplicateEmail => Self::Conflict(msg),
            AuthError::InvalidCredentials | AuthError::Unauthorized => Self::Unauthorized(msg),
            AuthError::InvalidToken | AuthError::InvalidOrExpiredToken => Self::BadRequest(msg),
            AuthError::UserNotFound => Self::NotFound(msg),
            AuthError::Forbidden => Self::Forbidden(msg),
            // Details were logged where the fault happened
            AuthError::Infrastructure(_) => Self::Internal("Internal error".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Validate an email address shape: one `@`, non-empty local part and a
/// dotted domain, no whitespace.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::bad_request("Email is too long"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ApiError::bad_request("Invalid email address"));
    };
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}

/// Validate a password against the accepted length range.
pub fn validate_new_password(password: &str) -> Result<(), ApiError> {
    validate_password(password).map_err(ApiError::BadRequest)
}
