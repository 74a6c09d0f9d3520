use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Serialize;

use super::error::ApiError;
use crate::auth::{AdminOnly, Auth};
use crate::db::{User, UserRole};
use crate::engine::AuthEngine;
use crate::error::{AuthError, ResultExt};
use crate::guard::AccessGuard;
use crate::impl_has_auth_backend;

#[derive(Clone)]
pub struct UsersState {
    pub engine: AuthEngine,
    pub guard: AccessGuard,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(me))
        .route("/promote/{id}", post(promote))
        .route("/demote/{id}", post(demote))
        .with_state(state)
}

#[derive(Serialize)]
struct ProfileResponse {
    id: i64,
    email: String,
    role: UserRole,
    verified: bool,
    created_at: String,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            verified: user.verified,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
struct UserListItem {
    id: i64,
    email: String,
    role: UserRole,
    active: bool,
    verified: bool,
}

#[derive(Serialize)]
struct RoleChangeResponse {
    message: String,
}

async fn me(
    State(state): State<UsersState>,
    auth: Auth,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state
        .engine
        .db()
        .users()
        .get_by_id(auth.identity().id)
        .await
        .infra("Failed to look up user")?
        .ok_or(AuthError::Unauthorized)?;

    Ok(Json(user.into()))
}

async fn list_users(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
) -> Result<Json<Vec<UserListItem>>, ApiError> {
    let users = state.engine.list_users().await?;
    Ok(Json(
        users
            .into_iter()
            .map(|u| UserListItem {
                id: u.id,
                email: u.email,
                role: u.role,
                active: u.active,
                verified: u.verified,
            })
            .collect(),
    ))
}

async fn promote(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    change_role(&state, id, UserRole::Admin).await
}

async fn demote(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    change_role(&state, id, UserRole::User).await
}

async fn change_role(
    state: &UsersState,
    id: i64,
    role: UserRole,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let user = state.engine.set_role(id, role).await?;
    Ok(Json(RoleChangeResponse {
        message: format!("{} is now {}", user.email, user.role),
    }))
}
