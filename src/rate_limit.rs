//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Requests per minute allowed per client IP.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub login_per_minute: u32,
    pub register_per_minute: u32,
    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy)
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_minute: 10,
            register_per_minute: 5,
            trust_forwarded_for: false,
        }
    }
}

/// Limiter for a single endpoint group.
#[derive(Clone)]
pub struct EndpointLimit {
    limiter: Arc<IpLimiter>,
    trust_forwarded_for: bool,
    message: &'static str,
}

impl EndpointLimit {
    fn per_minute(per_minute: u32, trust_forwarded_for: bool, message: &'static str) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            trust_forwarded_for,
            message,
        }
    }
}

/// Rate limiting configuration for the credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub login: EndpointLimit,
    pub register: EndpointLimit,
}

impl RateLimitConfig {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            login: EndpointLimit::per_minute(
                settings.login_per_minute,
                settings.trust_forwarded_for,
                "Too many login attempts. Please wait before trying again.",
            ),
            register: EndpointLimit::per_minute(
                settings.register_per_minute,
                settings.trust_forwarded_for,
                "Too many signup attempts. Please wait before trying again.",
            ),
        }
    }
}

/// Middleware that rejects requests once the client IP exceeds its quota.
pub async fn rate_limit(
    State(limit): State<EndpointLimit>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ip) = extract_client_ip(&request, limit.trust_forwarded_for) else {
        return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
    };

    match limit.limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => (StatusCode::TOO_MANY_REQUESTS, limit.message).into_response(),
    }
}
