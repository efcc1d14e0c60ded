//! Authentication module: configuration, credential handling, token minting,
//! the authorization guard chain, and REST route handlers.

use std::sync::Arc;

pub mod config;
pub mod cookies;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod refresh_store;
pub mod responses;
pub mod routes;
pub mod service;
pub mod validation;

pub use config::{AppConfig, AuthConfig};
pub use error::{AuthError, AuthResult};
pub use guards::{AuthMetadata, AuthType, GuardChain};
pub use jwt::JwtService;
pub use passwords::PasswordService;
pub use refresh_store::{PgRefreshTokenStore, RefreshTokenStore};
pub use service::AuthenticationService;

use crate::users::{UserService, UserStore};

/// Everything the transports need to authenticate requests, managed as
/// Rocket state.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub jwt_service: Arc<JwtService>,
    pub users: UserService,
    pub authentication: AuthenticationService,
    pub guard_chain: GuardChain,
}

impl AuthState {
    /// `refresh_store` is only consulted when `config.refresh_token_rotation`
    /// is set, and must be present in that case.
    pub fn new(
        config: AuthConfig,
        user_store: Arc<dyn UserStore>,
        refresh_store: Option<Arc<dyn RefreshTokenStore>>,
    ) -> AuthResult<Self> {
        let refresh_store = if config.refresh_token_rotation {
            Some(refresh_store.ok_or_else(|| {
                AuthError::Config(
                    "refresh token rotation is enabled but no refresh token store is available"
                        .into(),
                )
            })?)
        } else {
            None
        };

        let password_service = Arc::new(PasswordService::new()?);
        let jwt_service = Arc::new(JwtService::from_config(&config)?);
        let users = UserService::new(user_store.clone(), password_service.clone());
        let authentication = AuthenticationService::new(
            users.clone(),
            password_service.clone(),
            jwt_service.clone(),
            refresh_store,
        );
        let guard_chain = GuardChain::new(jwt_service.clone(), user_store);

        Ok(Self {
            config,
            password_service,
            jwt_service,
            users,
            authentication,
            guard_chain,
        })
    }
}
