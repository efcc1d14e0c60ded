use crate::auth::{AuthError, AuthResult};

const TEN_YEARS_SECS: i64 = 10 * 365 * 24 * 60 * 60;
/// Upper bound for any configured lifetime; keeps `exp` arithmetic in range.
pub const MAX_LIFETIME_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub token_cookie_max_age_secs: i64,
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub refresh_token_rotation: bool,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| AuthError::Config("JWT_SECRET is required".into()))?;
        let access_token_ttl_secs = env_lifetime("JWT_ACCESS_TOKEN_TTL", 3600)?;
        let refresh_token_ttl_secs = env_lifetime("JWT_REFRESH_TOKEN_TTL", 86400)?;
        let token_cookie_max_age_secs =
            env_lifetime("AUTH_TOKEN_COOKIE_MAX_AGE_SECS", TEN_YEARS_SECS)?;
        let cookie_domain = std::env::var("AUTH_COOKIE_DOMAIN").ok();
        let cookie_secure = env_bool("AUTH_COOKIE_SECURE", false);
        let refresh_token_rotation = env_bool("AUTH_REFRESH_TOKEN_ROTATION", false);

        Ok(Self {
            jwt_secret,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            token_cookie_max_age_secs,
            access_cookie_name: "accessToken".into(),
            refresh_cookie_name: "refreshToken".into(),
            cookie_domain,
            cookie_secure,
            refresh_token_rotation,
        })
    }

    /// Defaults used by tests and local tooling; everything except the secret
    /// matches what `from_env` falls back to.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 86400,
            token_cookie_max_age_secs: TEN_YEARS_SECS,
            access_cookie_name: "accessToken".into(),
            refresh_cookie_name: "refreshToken".into(),
            cookie_domain: None,
            cookie_secure: false,
            refresh_token_rotation: false,
        }
    }
}

/// Application-level settings that are not specific to authentication.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub is_development: bool,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let is_development = std::env::var("APP_ENV")
            .map(|value| value.eq_ignore_ascii_case("development"))
            .unwrap_or(false);
        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Self {
            is_development,
            cors_allowed_origins,
        }
    }
}

fn env_lifetime(key: &str, default: i64) -> AuthResult<i64> {
    parse_lifetime(key, std::env::var(key).ok().as_deref(), default)
}

/// Parse a lifetime in seconds. Unset falls back to `default`; anything that
/// is not an integer in `1..=MAX_LIFETIME_SECS` is a configuration error.
fn parse_lifetime(key: &str, raw: Option<&str>, default: i64) -> AuthResult<i64> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(default);
    };
    let secs = raw
        .parse::<i64>()
        .map_err(|_| AuthError::Config(format!("{key} must be a whole number of seconds, got '{raw}'")))?;
    check_lifetime(key, secs)
}

pub(crate) fn check_lifetime(key: &str, secs: i64) -> AuthResult<i64> {
    if secs <= 0 || secs > MAX_LIFETIME_SECS {
        return Err(AuthError::Config(format!(
            "{key} must be between 1 and {MAX_LIFETIME_SECS} seconds, got {secs}"
        )));
    }
    Ok(secs)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
        .unwrap_or(default)
}
