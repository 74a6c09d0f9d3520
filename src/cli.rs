//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::{Database, UserRole, normalize_email};
use crate::jwt::{SigningContext, parse_algorithm};
use crate::notify::LogNotifier;
use crate::rate_limit::RateLimitSettings;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Longest accepted access token lifetime: one year
pub const MAX_ACCESS_TOKEN_MINUTES: u64 = 525_600;

/// Longest accepted refresh token lifetime: ten years
pub const MAX_REFRESH_TOKEN_DAYS: u64 = 3650;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Latchkey",
    about = "Email and password accounts with rotating refresh sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_URL", default_value = "latchkey.db")]
    pub database: String,

    /// Front-end origin used in emailed links (e.g., "https://app.example.com")
    #[arg(long, env = "APP_URL", default_value = "http://localhost:3000")]
    pub app_url: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Token signing algorithm (HS256, HS384 or HS512)
    #[arg(long, env = "JWT_ALGORITHM", default_value = "HS256")]
    pub jwt_algorithm: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE_MINUTES", default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..=MAX_ACCESS_TOKEN_MINUTES))]
    pub access_token_expire_minutes: u64,

    /// Refresh token lifetime in days
    #[arg(long, env = "REFRESH_TOKEN_EXPIRE_DAYS", default_value = "7",
        value_parser = clap::value_parser!(u64).range(1..=MAX_REFRESH_TOKEN_DAYS))]
    pub refresh_token_expire_days: u64,

    /// bcrypt work factor for password hashes
    #[arg(long, default_value_t = bcrypt::DEFAULT_COST,
        value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Login attempts allowed per client IP per minute
    #[arg(long, default_value = "10")]
    pub login_rate_limit: u32,

    /// Signups allowed per client IP per minute
    #[arg(long, default_value = "5")]
    pub register_rate_limit: u32,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Promote an existing account to admin on startup
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn rate_limits(&self) -> RateLimitSettings {
        RateLimitSettings {
            login_per_minute: self.login_rate_limit,
            register_per_minute: self.register_rate_limit,
            trust_forwarded_for: self.trust_forwarded_for,
        }
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build the signing context from the secret and the algorithm/lifetime flags.
/// Returns None and logs an error if the algorithm is not supported or a
/// lifetime is out of range.
pub fn build_signing_context(secret: &str, args: &Args) -> Option<SigningContext> {
    let algorithm = match parse_algorithm(&args.jwt_algorithm) {
        Ok(algorithm) => algorithm,
        Err(e) => {
            error!(algorithm = %args.jwt_algorithm, error = %e, "Invalid JWT algorithm");
            return None;
        }
    };

    let context = SigningContext::new(secret.as_bytes())
        .with_algorithm(algorithm)
        .map_err(|e| error!(error = %e, "Invalid JWT algorithm"))
        .ok()?;

    let access_secs = lifetime_secs(
        args.access_token_expire_minutes,
        MAX_ACCESS_TOKEN_MINUTES,
        60,
        "access token lifetime (minutes)",
    )?;
    let refresh_secs = lifetime_secs(
        args.refresh_token_expire_days,
        MAX_REFRESH_TOKEN_DAYS,
        24 * 60 * 60,
        "refresh token lifetime (days)",
    )?;

    Some(
        context
            .with_access_ttl(Duration::from_secs(access_secs))
            .with_refresh_ttl(Duration::from_secs(refresh_secs)),
    )
}

fn lifetime_secs(value: u64, max: u64, unit_secs: u64, what: &str) -> Option<u64> {
    if value == 0 || value > max {
        error!(value, max, "Invalid {}", what);
        return None;
    }
    value.checked_mul(unit_secs).or_else(|| {
        error!(value, "Overflow computing {}", what);
        None
    })
}

/// Parse and validate the app URL.
/// Returns None and logs an error if validation fails.
pub fn validate_app_url(app_url: &str) -> Option<Url> {
    let url = match Url::parse(app_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %app_url, error = %e, "Invalid app URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        error!(url = %app_url, "App URL must be an http or https origin");
        return None;
    }

    Some(url)
}

/// Handle the --create-admin flag: promote an existing account.
pub async fn handle_create_admin(db: &Database, email: &str) {
    let email = normalize_email(email);

    let user = match db.users().get_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            error!(email = %email, "No account with this email. Register it first");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Failed to look up admin account");
            std::process::exit(1);
        }
    };

    if user.role == UserRole::Admin {
        info!(email = %email, "Account is already an admin");
        return;
    }

    match db.users().set_role(user.id, UserRole::Admin).await {
        Ok(_) => info!(email = %email, user_id = user.id, "Account promoted to admin"),
        Err(e) => {
            error!(error = %e, "Failed to promote admin account");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    signing: SigningContext,
    app_url: Url,
    bcrypt_cost: u32,
    rate_limits: RateLimitSettings,
) -> ServerConfig {
    ServerConfig {
        db,
        signing,
        bcrypt_cost,
        app_url,
        notifier: Arc::new(LogNotifier),
        rate_limits,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
