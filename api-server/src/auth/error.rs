use async_graphql::ErrorExtensions;
use rocket::http::Status;
use thiserror::Error;
use uuid::Uuid;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    // Reported as an authentication failure, matching the existing clients.
    #[error("Email is already registered")]
    EmailAlreadyRegistered,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token reuse detected")]
    TokenReuseDetected { user_id: Uuid },
    #[error("user not found")]
    UserNotFound,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Sqlx(#[from] rocket_db_pools::sqlx::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("unexpected error: {0}")]
    Other(String),
}

impl AuthError {
    /// Generic rejection used when no guard admits a request.
    pub fn unauthorized() -> Self {
        AuthError::Unauthorized("Unauthorized".into())
    }

    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials
            | AuthError::EmailAlreadyRegistered
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::TokenReuseDetected { .. }
            | AuthError::UserNotFound
            | AuthError::Unauthorized(_) => Status::Unauthorized,
            AuthError::Validation(_) => Status::BadRequest,
            AuthError::Config(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Other(_) => Status::InternalServerError,
        }
    }

    /// Machine-readable code placed in GraphQL error extensions.
    pub fn code(&self) -> &'static str {
        match self.status().code {
            401 => "UNAUTHENTICATED",
            400 => "BAD_USER_INPUT",
            _ => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status() == Status::InternalServerError
    }

    /// Message safe to send to clients. Internal failures are logged instead.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            log::error!("internal error while handling request: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl ErrorExtensions for AuthError {
    fn extend(&self) -> async_graphql::Error {
        let code = self.code();
        async_graphql::Error::new(self.public_message()).extend_with(|_, e| e.set("code", code))
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}
