//! User persistence and the service that owns password hashing on write.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::validation::{validate_email, validate_password};
use crate::auth::{AuthError, AuthResult, PasswordService};
use crate::models::{NewUser, ProfileUpdate, Registration, User, UserChanges};

pub mod store;

pub use store::{PgUserStore, UserStore};

/// Creates and updates users. Any plaintext password is hashed here, before
/// the record reaches the store.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    passwords: Arc<PasswordService>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, passwords: Arc<PasswordService>) -> Self {
        Self { store, passwords }
    }

    pub async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        self.store.find_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        self.store.find_by_email(email).await
    }

    pub async fn create(&self, registration: Registration) -> AuthResult<User> {
        let password_hash = self.passwords.hash(&registration.password)?;
        self.store
            .insert(NewUser {
                email: registration.email,
                first_name: registration.first_name,
                last_name: registration.last_name,
                password_hash,
            })
            .await
    }

    pub async fn update(&self, id: Uuid, update: ProfileUpdate) -> AuthResult<User> {
        if let Some(email) = update.email.as_deref() {
            validate_email(email)?;
            if let Some(existing) = self.store.find_by_email(email).await? {
                if existing.id != id {
                    return Err(AuthError::EmailAlreadyRegistered);
                }
            }
        }

        let password_hash = match update.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(self.passwords.hash(password)?)
            }
            None => None,
        };

        let changes = UserChanges {
            email: update.email,
            first_name: update.first_name,
            last_name: update.last_name,
            password_hash,
        };

        if changes.is_empty() {
            return self.store.find_by_id(id).await?.ok_or(AuthError::UserNotFound);
        }

        self.store
            .update(id, changes)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryUserStore;

    fn service() -> (UserService, Arc<PasswordService>) {
        let passwords = Arc::new(PasswordService::new().expect("password service"));
        let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::default());
        (UserService::new(store, passwords.clone()), passwords)
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
    async fn create_stores_a_hash_not_the_plaintext() {
        let (service, passwords) = service();
        let user = service.create(registration("a@b.com")).await.expect("create");

        assert_ne!(user.password_hash, "12345678");
        assert!(passwords.compare("12345678", &user.password_hash).expect("compare"));
    }

    #[tokio::test]
    async fn update_rehashes_a_new_password() {
        let (service, passwords) = service();
        let user = service.create(registration("a@b.com")).await.expect("create");

        let updated = service
            .update(
                user.id,
                ProfileUpdate {
                    password: Some("new-password".into()),
                    first_name: Some("Ada".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.first_name, "Ada");
        assert_eq!(updated.last_name, "B");
        assert_ne!(updated.password_hash, "new-password");
        assert!(passwords.compare("new-password", &updated.password_hash).expect("compare"));
        assert!(updated.updated_at >= user.updated_at);
    }

    #[tokio::test]
    async fn update_refuses_an_email_owned_by_someone_else() {
        let (service, _) = service();
        service.create(registration("taken@b.com")).await.expect("first");
        let other = service.create(registration("other@b.com")).await.expect("second");

        let err = service
            .update(
                other.id,
                ProfileUpdate {
                    email: Some("taken@b.com".into()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("duplicate email");
        assert!(matches!(err, AuthError::EmailAlreadyRegistered));
    }

    #[tokio::test]
    async fn update_of_missing_user_fails() {
        let (service, _) = service();
        let err = service
            .update(
                Uuid::new_v4(),
                ProfileUpdate {
                    last_name: Some("Z".into()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("missing user");
        assert!(matches!(err, AuthError::UserNotFound));
    }
}
