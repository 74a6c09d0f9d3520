//! Authentication error types.

use axum::response::{IntoResponse, Response};

use crate::error::AuthError;

/// Internal auth error kind used by the extractors.
///
/// Only two outcomes are visible to clients: the request is not
/// authenticated, or the caller lacks the required role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AuthErrorKind {
    NotAuthenticated,
    InsufficientRole,
    Internal,
}

/// API authentication errors (returns JSON).
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.kind {
            AuthErrorKind::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AuthErrorKind::InsufficientRole => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::InsufficientRole => "Insufficient permissions",
            AuthErrorKind::Internal => "Internal error",
        }
    }
}

impl From<AuthError> for ApiAuthError {
    fn from(e: AuthError) -> Self {
        let kind = match e {
            AuthError::Forbidden => AuthErrorKind::InsufficientRole,
            AuthError::Infrastructure(_) => AuthErrorKind::Internal,
            _ => AuthErrorKind::NotAuthenticated,
        };
        Self::new(kind)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use axum::http::{HeaderValue, header};
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if self.kind == AuthErrorKind::NotAuthenticated {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}
