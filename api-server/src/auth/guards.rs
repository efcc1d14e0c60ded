//! Authorization guard chain.
//!
//! Each route declares the authentication strategies it accepts. The chain
//! turns those declarations into guards, evaluates them in order and admits
//! the request at the first guard that allows it. When none does, the last
//! guard error is returned.

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::{AuthError, AuthResult, JwtService};
use crate::models::User;
use crate::request_context::RequestContext;
use crate::users::UserStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    Bearer,
    None,
}

/// Strategies applied to routes without explicit metadata.
pub const DEFAULT_AUTH_TYPES: &[AuthType] = &[AuthType::Bearer];

/// Route metadata: accepted strategies per handler, with class-wide fallbacks.
///
/// A class is the GraphQL parent type (`Query`, `Mutation`) or any other
/// grouping the transport uses; a handler is a field or route name within it.
#[derive(Debug, Clone, Default)]
pub struct AuthMetadata {
    classes: HashMap<String, Vec<AuthType>>,
    handlers: HashMap<(String, String), Vec<AuthType>>,
}

impl AuthMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: &str, auth_types: impl IntoIterator<Item = AuthType>) -> Self {
        self.classes
            .insert(class.to_string(), auth_types.into_iter().collect());
        self
    }

    pub fn handler(
        mut self,
        class: &str,
        handler: &str,
        auth_types: impl IntoIterator<Item = AuthType>,
    ) -> Self {
        self.handlers.insert(
            (class.to_string(), handler.to_string()),
            auth_types.into_iter().collect(),
        );
        self
    }

    /// Handler metadata overrides class metadata; without either the
    /// default applies.
    pub fn resolve(&self, class: &str, handler: &str) -> &[AuthType] {
        self.handlers
            .get(&(class.to_string(), handler.to_string()))
            .or_else(|| self.classes.get(class))
            .map(Vec::as_slice)
            .unwrap_or(DEFAULT_AUTH_TYPES)
    }
}

/// Verifies the bearer access token and binds the user to the request.
pub struct BearerGuard {
    jwt_service: Arc<JwtService>,
    users: Arc<dyn UserStore>,
}

impl BearerGuard {
    pub fn new(jwt_service: Arc<JwtService>, users: Arc<dyn UserStore>) -> Self {
        Self { jwt_service, users }
    }

    pub async fn can_activate(&self, request: &RequestContext) -> AuthResult<bool> {
        let token = bearer_token(request.authorization()).ok_or_else(AuthError::unauthorized)?;

        let user = self.authenticate(token).await.map_err(|err| {
            log::debug!("bearer authentication rejected: {}", err);
            AuthError::Unauthorized(format!("Authentication failed: {}", err.public_message()))
        })?;

        request.set_current_user(user);
        Ok(true)
    }

    async fn authenticate(&self, token: &str) -> AuthResult<User> {
        let claims = self.jwt_service.decode_access_token(token)?;
        let user_id = claims.user_id()?;
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

pub enum AccessGuard<'a> {
    Bearer(&'a BearerGuard),
    Allow,
}

impl AccessGuard<'_> {
    pub async fn can_activate(&self, request: &RequestContext) -> AuthResult<bool> {
        match self {
            AccessGuard::Bearer(guard) => guard.can_activate(request).await,
            AccessGuard::Allow => Ok(true),
        }
    }
}

#[derive(Clone)]
pub struct GuardChain {
    bearer: Arc<BearerGuard>,
}

impl GuardChain {
    pub fn new(jwt_service: Arc<JwtService>, users: Arc<dyn UserStore>) -> Self {
        Self {
            bearer: Arc::new(BearerGuard::new(jwt_service, users)),
        }
    }

    pub fn guards_for(&self, auth_types: &[AuthType]) -> Vec<AccessGuard<'_>> {
        auth_types
            .iter()
            .map(|auth_type| match auth_type {
                AuthType::Bearer => AccessGuard::Bearer(&self.bearer),
                AuthType::None => AccessGuard::Allow,
            })
            .collect()
    }

    pub async fn authorize(&self, auth_types: &[AuthType], request: &RequestContext) -> AuthResult<()> {
        let mut error = AuthError::unauthorized();

        for guard in self.guards_for(auth_types) {
            match guard.can_activate(request).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(err) => error = err,
            }
        }

        Err(error)
    }
}

/// Second whitespace-separated segment of `Bearer <token>`.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    scheme.eq_ignore_ascii_case("Bearer").then_some(token)
}
