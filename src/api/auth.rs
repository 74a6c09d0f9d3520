use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{ApiError, validate_email, validate_new_password};
use crate::engine::{AuthEngine, TokenPair};
use crate::error::AuthError;
use crate::flows::ActionTokenFlows;
use crate::notify::DeliveryStatus;
use crate::rate_limit::{RateLimitConfig, rate_limit};

#[derive(Clone)]
pub struct AuthState {
    pub engine: AuthEngine,
    pub flows: ActionTokenFlows,
}

pub fn router(state: AuthState, limits: RateLimitConfig) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(limits.login, rate_limit));

    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(limits.register, rate_limit));

    let open_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/request-password-reset", post(request_password_reset))
        .route("/reset-password", post(reset_password))
        .route("/verify-email", get(verify_email))
        .with_state(state);

    Router::new()
        .merge(login_router)
        .merge(register_router)
        .merge(open_router)
}

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Deserialize)]
struct ResetRequest {
    email: String,
}

#[derive(Deserialize)]
struct ResetConfirmRequest {
    token: String,
    password: String,
}

#[derive(Deserialize)]
struct VerifyQuery {
    token: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "bearer",
        }
    }
}

fn message(message: &'static str) -> Json<MessageResponse> {
    Json(MessageResponse { message })
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_email(&payload.email)?;
    validate_new_password(&payload.password)?;

    let user = state.engine.register(&payload.email, &payload.password).await?;

    match state.flows.send_verification(&user) {
        Ok(DeliveryStatus::Accepted) => {}
        Ok(DeliveryStatus::Failed) => {
            info!(user_id = user.id, "Registered without a verification email");
        }
        Err(e) => {
            warn!(user_id = user.id, error = %e, "Verification email not sent");
        }
    }

    Ok((
        StatusCode::CREATED,
        message("User registered. Please verify your email."),
    ))
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    validate_email(&payload.email)?;
    validate_new_password(&payload.password)?;

    let (tokens, _user) = state.engine.login(&payload.email, &payload.password).await?;
    Ok(Json(tokens.into()))
}

async fn refresh(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let tokens = state
        .engine
        .refresh(&payload.refresh_token)
        .await
        .map_err(|e| match e {
            AuthError::InvalidToken => ApiError::unauthorized("Invalid refresh token"),
            other => other.into(),
        })?;
    Ok(Json(tokens.into()))
}

async fn logout(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.engine.logout(&payload.refresh_token).await?;
    Ok(message("Logged out"))
}

async fn request_password_reset(
    State(state): State<AuthState>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let msg = state.flows.request_password_reset(&payload.email).await?;
    Ok(message(msg))
}

async fn reset_password(
    State(state): State<AuthState>,
    Json(payload): Json<ResetConfirmRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_new_password(&payload.password)?;

    state
        .flows
        .reset_password(&payload.token, &payload.password)
        .await?;
    Ok(message("Password updated"))
}

async fn verify_email(
    State(state): State<AuthState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.flows.verify_email(&query.token).await?;
    Ok(message("Email verified"))
}
