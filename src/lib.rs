pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod engine;
pub mod error;
pub mod flows;
pub mod guard;
pub mod jwt;
pub mod notify;
pub mod password;
pub mod rate_limit;

use api::create_api_router;
use axum::{Json, Router, routing::get};
use db::Database;
use engine::AuthEngine;
use flows::ActionTokenFlows;
use guard::AccessGuard;
use jwt::{SigningContext, TokenCodec};
use notify::Notifier;
use password::CredentialStore;
use rate_limit::{RateLimitConfig, RateLimitSettings};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Signing key, algorithm and token lifetimes
    pub signing: SigningContext,
    /// bcrypt work factor for new password hashes
    pub bcrypt_cost: u32,
    /// Front-end origin that emailed links point at
    pub app_url: Url,
    /// Outbound email
    pub notifier: Arc<dyn Notifier>,
    /// Per-IP limits on login and registration
    pub rate_limits: RateLimitSettings,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::new(&config.signing));

    let engine = AuthEngine::new(
        config.db.clone(),
        codec.clone(),
        CredentialStore::new(config.bcrypt_cost),
    );
    let guard = AccessGuard::new(config.db.clone(), codec);
    let flows = ActionTokenFlows::new(
        engine.clone(),
        config.notifier.clone(),
        config.app_url.clone(),
    );

    let api_router = create_api_router(
        engine,
        flows,
        guard,
        RateLimitConfig::new(config.rate_limits),
    );

    Router::new()
        .route("/health", get(health))
        .merge(api_router)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
