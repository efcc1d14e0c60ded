//! One-way credential hashing backed by Argon2id.

use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(19 * 1024); // 19 MiB
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder.build()?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Produce a PHC-encoded hash with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)?;
        let hashed = self.argon2.hash_password(plaintext.as_bytes(), &salt)?;
        Ok(hashed.to_string())
    }

    /// `Ok(false)` on mismatch; an error only when `hashed` is not a valid PHC string.
    pub fn compare(&self, plaintext: &str, hashed: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(hashed)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_compares_passwords() {
        let service = PasswordService::new().expect("password service");
        let hash = service.hash("12345678").expect("hash generation");

        assert_ne!(hash, "12345678");
        assert!(service.compare("12345678", &hash).expect("compare succeeds"));
        assert!(!service.compare("87654321", &hash).expect("compare runs"));
    }

    #[test]
    fn salts_every_hash() {
        let service = PasswordService::new().expect("password service");
        let first = service.hash("same-password").expect("first hash");
        let second = service.hash("same-password").expect("second hash");
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let service = PasswordService::new().expect("password service");
        let err = service
            .compare("whatever", "not-a-phc-string")
            .expect_err("malformed hash rejected");
        assert!(matches!(err, AuthError::PasswordHash(_)));
    }
}
