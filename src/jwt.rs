//! Signed, expiring token encoding and decoding.
//!
//! Every token kind shares one HMAC secret and one algorithm. The `type`
//! field inside the payload is what separates an access token from a refresh,
//! verify or reset token, so callers always match on [`Claims`] before using
//! any other field.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::db::UserRole;

/// Default access token lifetime: 30 minutes
pub const DEFAULT_ACCESS_TOKEN_MINUTES: u64 = 30;

/// Default refresh token lifetime: 7 days
pub const DEFAULT_REFRESH_TOKEN_DAYS: u64 = 7;

/// Email verification token lifetime: 1 day
pub const VERIFY_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Password reset token lifetime: 2 hours
pub const RESET_TOKEN_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Decoded token payload, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Claims {
    /// Short-lived proof of identity. `sub` is the account email.
    Access { sub: String, role: UserRole },
    /// Long-lived renewal token carrying a refresh session secret.
    Refresh { token: String },
    /// Email verification action token.
    Verify { sub: String },
    /// Password reset action token.
    Reset { sub: String },
}

/// Wire form of a token payload: the claims plus the absolute expiry.
#[derive(Serialize, Deserialize)]
struct SignedClaims {
    #[serde(flatten)]
    claims: Claims,
    exp: u64,
}

/// Signing secret, algorithm and default lifetimes.
#[derive(Clone)]
pub struct SigningContext {
    secret: Vec<u8>,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SigningContext {
    /// HS256 with the default access and refresh lifetimes.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
            algorithm: Algorithm::HS256,
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TOKEN_MINUTES * 60),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TOKEN_DAYS * 24 * 60 * 60),
        }
    }

    /// Use a different HMAC algorithm. Asymmetric algorithms are rejected.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Result<Self, TokenError> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                self.algorithm = algorithm;
                Ok(self)
            }
            other => Err(TokenError::UnsupportedAlgorithm(format!("{:?}", other))),
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Parse an algorithm name such as `HS256`. Only HMAC algorithms are accepted.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(TokenError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Mints and verifies token strings for a single [`SigningContext`].
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(context: &SigningContext) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(&context.secret),
            decoding_key: DecodingKey::from_secret(&context.secret),
            algorithm: context.algorithm,
            access_ttl: context.access_ttl,
            refresh_ttl: context.refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign `claims` with an expiry of `now + ttl`.
    pub fn mint(&self, claims: &Claims, ttl: Duration) -> Result<String, TokenError> {
        let exp = unix_now()?
            .checked_add(ttl.as_secs())
            .ok_or(TokenError::ExpiryOverflow)?;
        self.encode(claims, exp)
    }

    fn encode(&self, claims: &Claims, exp: u64) -> Result<String, TokenError> {
        let signed = SignedClaims {
            claims: claims.clone(),
            exp,
        };
        jsonwebtoken::encode(&Header::new(self.algorithm), &signed, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Verify signature and expiry. Any failure yields `None`; the reason is
    /// only logged.
    pub fn decode(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        match jsonwebtoken::decode::<SignedClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims.claims),
            Err(e) => {
                debug!(error = %e, "Rejected token");
                None
            }
        }
    }
}

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::Time)
}

/// Errors that can occur while minting tokens or building a signing context.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("System time error")]
    Time,
    #[error("Token lifetime is too long")]
    ExpiryOverflow,
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
}
