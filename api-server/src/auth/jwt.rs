use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::config::check_lifetime;
use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Signed payload: the user id, timing claims, and any extra claims flattened
/// alongside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims<T> {
    pub id: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub extra: T,
}

impl<T> TokenClaims<T> {
    pub fn user_id(&self) -> AuthResult<Uuid> {
        self.id.parse().map_err(|_| AuthError::TokenInvalid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    pub refresh_token_id: String,
}

pub type AccessTokenClaims = TokenClaims<AccessClaims>;
pub type RefreshTokenClaims = TokenClaims<RefreshClaims>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_ttl_secs: i64,
    refresh_token_ttl_secs: i64,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Config("JWT secret must not be empty".into()));
        }
        let access_token_ttl_secs = check_lifetime("access token TTL", config.access_token_ttl_secs)?;
        let refresh_token_ttl_secs =
            check_lifetime("refresh token TTL", config.refresh_token_ttl_secs)?;
        let secret_bytes = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret_bytes),
            decoding_key: DecodingKey::from_secret(secret_bytes),
            validation,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
        })
    }

    pub fn sign_token<T: Serialize>(
        &self,
        user_id: Uuid,
        expires_in_secs: i64,
        extra: T,
    ) -> AuthResult<String> {
        let now = Utc::now();
        let expires_at = Duration::try_seconds(expires_in_secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::Other(format!("token lifetime of {expires_in_secs}s is out of range"))
            })?;
        let claims = TokenClaims {
            id: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            extra,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn verify_token<T: DeserializeOwned>(&self, token: &str) -> AuthResult<TokenClaims<T>> {
        decode::<TokenClaims<T>>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }

    pub fn issue_access_token(&self, user_id: Uuid, email: &str) -> AuthResult<String> {
        self.sign_token(
            user_id,
            self.access_token_ttl_secs,
            AccessClaims {
                email: email.to_string(),
            },
        )
    }

    pub fn issue_refresh_token(&self, user_id: Uuid, refresh_token_id: Uuid) -> AuthResult<String> {
        self.sign_token(
            user_id,
            self.refresh_token_ttl_secs,
            RefreshClaims {
                refresh_token_id: refresh_token_id.to_string(),
            },
        )
    }

    pub fn decode_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        self.verify_token(token)
    }

    pub fn decode_refresh_token(&self, token: &str) -> AuthResult<RefreshTokenClaims> {
        self.verify_token(token)
    }

    pub fn refresh_token_ttl_secs(&self) -> i64 {
        self.refresh_token_ttl_secs
    }
}
