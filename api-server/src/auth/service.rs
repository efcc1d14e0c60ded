//! Sign-up, sign-in and token refresh.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::jwt::TokenPair;
use crate::auth::validation::validate_credentials;
use crate::auth::{AuthError, AuthResult, JwtService, PasswordService, RefreshTokenStore};
use crate::models::{Registration, User};
use crate::users::UserService;

#[derive(Clone)]
pub struct AuthenticationService {
    users: UserService,
    passwords: Arc<PasswordService>,
    jwt_service: Arc<JwtService>,
    refresh_store: Option<Arc<dyn RefreshTokenStore>>,
}

impl AuthenticationService {
    /// `refresh_store` turns on rotation: every refresh id is recorded on
    /// issue and can be exchanged exactly once.
    pub fn new(
        users: UserService,
        passwords: Arc<PasswordService>,
        jwt_service: Arc<JwtService>,
        refresh_store: Option<Arc<dyn RefreshTokenStore>>,
    ) -> Self {
        Self {
            users,
            passwords,
            jwt_service,
            refresh_store,
        }
    }

    pub async fn sign_up(&self, registration: Registration) -> AuthResult<User> {
        validate_credentials(&registration.email, &registration.password)?;

        if self.users.find_by_email(&registration.email).await?.is_some() {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let user = self.users.create(registration).await?;
        log::info!("registered user {}", user.id);
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<TokenPair> {
        validate_credentials(email, password)?;

        let Some(user) = self.users.find_by_email(email).await? else {
            log::debug!("sign-in rejected: no user for the supplied email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.passwords.compare(password, &user.password_hash)? {
            log::debug!("sign-in rejected: password mismatch for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        self.generate_tokens(&user).await
    }

    pub async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims = self.jwt_service.decode_refresh_token(refresh_token)?;
        let user_id = claims.user_id()?;

        if let Some(store) = &self.refresh_store {
            let token_id: Uuid = claims
                .extra
                .refresh_token_id
                .parse()
                .map_err(|_| AuthError::TokenInvalid)?;

            if let Err(err) = store.consume(token_id, user_id, Utc::now()).await {
                if let AuthError::TokenReuseDetected { user_id } = &err {
                    let revoked = store.revoke_all_for_user(*user_id, Utc::now()).await?;
                    log::warn!(
                        "refresh token reuse for user {}; revoked {} outstanding tokens",
                        user_id,
                        revoked
                    );
                }
                return Err(err);
            }
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.generate_tokens(&user).await
    }

    pub async fn generate_tokens(&self, user: &User) -> AuthResult<TokenPair> {
        let refresh_token_id = Uuid::new_v4();

        let access_token = self.jwt_service.issue_access_token(user.id, &user.email)?;
        let refresh_token = self
            .jwt_service
            .issue_refresh_token(user.id, refresh_token_id)?;

        if let Some(store) = &self.refresh_store {
            let expires_at = Utc::now() + Duration::seconds(self.jwt_service.refresh_token_ttl_secs());
            store.record(refresh_token_id, user.id, expires_at).await?;
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::test_support::{MemoryRefreshTokenStore, MemoryUserStore};
    use crate::users::UserStore;

    struct Fixture {
        service: AuthenticationService,
        jwt: Arc<JwtService>,
    }

    fn fixture(refresh_store: Option<Arc<dyn RefreshTokenStore>>) -> Fixture {
        let passwords = Arc::new(PasswordService::new().expect("password service"));
        let jwt = Arc::new(
            JwtService::from_config(&AuthConfig::with_secret("service-secret")).expect("jwt"),
        );
        let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::default());
        let users = UserService::new(store, passwords.clone());
        Fixture {
            service: AuthenticationService::new(users, passwords, jwt.clone(), refresh_store),
            jwt,
        }
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.into(),
            password: "12345678".into(),
            first_name: "A".into(),
            last_name: "B".into(),
        }
    }

    #[tokio::test]
    async fn sign_in_returns_tokens_for_the_registered_user() {
        let fixture = fixture(None);
        let user = fixture
            .service
            .sign_up(registration("a@b.com"))
            .await
            .expect("sign up");

        let tokens = fixture
            .service
            .sign_in("a@b.com", "12345678")
            .await
            .expect("sign in");

        let access = fixture
            .jwt
            .decode_access_token(&tokens.access_token)
            .expect("access token");
        assert_eq!(access.user_id().expect("id"), user.id);
        assert_eq!(access.extra.email, "a@b.com");

        let refresh = fixture
            .jwt
            .decode_refresh_token(&tokens.refresh_token)
            .expect("refresh token");
        assert_eq!(refresh.user_id().expect("id"), user.id);
    }

    #[tokio::test]
    async fn sign_in_does_not_reveal_which_part_was_wrong() {
        let fixture = fixture(None);
        fixture
            .service
            .sign_up(registration("a@b.com"))
            .await
            .expect("sign up");

        let unknown = fixture
            .service
            .sign_in("nobody@b.com", "12345678")
            .await
            .expect_err("unknown email");
        let wrong = fixture
            .service
            .sign_in("a@b.com", "87654321")
            .await
            .expect_err("wrong password");

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicates_and_bad_input() {
        let fixture = fixture(None);
        fixture
            .service
            .sign_up(registration("a@b.com"))
            .await
            .expect("first sign up");

        let duplicate = fixture
            .service
            .sign_up(registration("a@b.com"))
            .await
            .expect_err("duplicate");
        assert_eq!(duplicate.to_string(), "Email is already registered");

        let mut short = registration("c@d.com");
        short.password = "short".into();
        assert!(matches!(
            fixture.service.sign_up(short).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            fixture.service.sign_up(registration("not-an-email")).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn refresh_issues_a_new_pair_and_keeps_old_tokens_valid() {
        let fixture = fixture(None);
        let user = fixture
            .service
            .sign_up(registration("a@b.com"))
            .await
            .expect("sign up");
        let first = fixture.service.generate_tokens(&user).await.expect("tokens");

        let second = fixture
            .service
            .refresh_tokens(&first.refresh_token)
            .await
            .expect("refresh");
        assert_ne!(first.refresh_token, second.refresh_token);

        fixture
            .service
            .refresh_tokens(&first.refresh_token)
            .await
            .expect("old refresh token still valid without rotation");
    }

    #[tokio::test]
    async fn refresh_rejects_tampered_expired_and_orphaned_tokens() {
        let fixture = fixture(None);

        let mut tampered = fixture
            .jwt
            .issue_refresh_token(Uuid::new_v4(), Uuid::new_v4())
            .expect("token");
        tampered.push('x');
        assert!(matches!(
            fixture.service.refresh_tokens(&tampered).await,
            Err(AuthError::TokenInvalid)
        ));

        let expired = fixture
            .jwt
            .sign_token(
                Uuid::new_v4(),
                -120,
                crate::auth::jwt::RefreshClaims {
                    refresh_token_id: Uuid::new_v4().to_string(),
                },
            )
            .expect("token");
        assert!(matches!(
            fixture.service.refresh_tokens(&expired).await,
            Err(AuthError::TokenExpired)
        ));

        let orphan = fixture
            .jwt
            .issue_refresh_token(Uuid::new_v4(), Uuid::new_v4())
            .expect("token");
        let err = fixture
            .service
            .refresh_tokens(&orphan)
            .await
            .expect_err("no such user");
        assert!(matches!(err, AuthError::UserNotFound));
        assert_eq!(err.status(), rocket::http::Status::Unauthorized);
    }

    #[tokio::test]
    async fn access_tokens_cannot_be_used_to_refresh() {
        let fixture = fixture(None);
        let user = fixture
            .service
            .sign_up(registration("a@b.com"))
            .await
            .expect("sign up");
        let tokens = fixture.service.generate_tokens(&user).await.expect("tokens");

        assert!(matches!(
            fixture.service.refresh_tokens(&tokens.access_token).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn rotation_detects_reuse_and_revokes_the_family() {
        let store = Arc::new(MemoryRefreshTokenStore::default());
        let ledger: Arc<dyn RefreshTokenStore> = store.clone();
        let fixture = fixture(Some(ledger));
        let user = fixture
            .service
            .sign_up(registration("a@b.com"))
            .await
            .expect("sign up");

        let first = fixture.service.generate_tokens(&user).await.expect("tokens");
        let second = fixture
            .service
            .refresh_tokens(&first.refresh_token)
            .await
            .expect("first exchange");

        let err = fixture
            .service
            .refresh_tokens(&first.refresh_token)
            .await
            .expect_err("replayed token");
        assert!(matches!(err, AuthError::TokenReuseDetected { .. }));
        assert_eq!(err.status(), rocket::http::Status::Unauthorized);

        assert!(matches!(
            fixture.service.refresh_tokens(&second.refresh_token).await,
            Err(AuthError::TokenReuseDetected { .. })
        ));
        assert_eq!(store.outstanding_for(user.id), 0);
    }

    #[tokio::test]
    async fn rotation_rejects_unknown_ids() {
        let store: Arc<dyn RefreshTokenStore> = Arc::new(MemoryRefreshTokenStore::default());
        let fixture = fixture(Some(store));
        let user = fixture
            .service
            .sign_up(registration("a@b.com"))
            .await
            .expect("sign up");

        let unrecorded = fixture
            .jwt
            .issue_refresh_token(user.id, Uuid::new_v4())
            .expect("token");
        assert!(matches!(
            fixture.service.refresh_tokens(&unrecorded).await,
            Err(AuthError::TokenInvalid)
        ));
    }
}
