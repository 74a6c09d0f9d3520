mod auth;
mod error;
mod users;

use axum::Router;

use crate::engine::AuthEngine;
use crate::flows::ActionTokenFlows;
use crate::guard::AccessGuard;
use crate::rate_limit::RateLimitConfig;

pub use auth::AuthState;
pub use error::ApiError;
pub use users::UsersState;

/// Create the API router.
pub fn create_api_router(
    engine: AuthEngine,
    flows: ActionTokenFlows,
    guard: AccessGuard,
    limits: RateLimitConfig,
) -> Router {
    let auth_state = auth::AuthState {
        engine: engine.clone(),
        flows,
    };

    let users_state = users::UsersState { engine, guard };

    Router::new()
        .nest("/auth", auth::router(auth_state, limits))
        .nest("/users", users::router(users_state))
}
