//! Input checks applied before credentials reach the services.

use regex::Regex;
use std::sync::OnceLock;

use crate::auth::{AuthError, AuthResult};

pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .expect("email regex is valid")
    })
}

pub fn validate_email(email: &str) -> AuthResult<()> {
    if email.len() <= 254 && email_regex().is_match(email) {
        Ok(())
    } else {
        Err(AuthError::Validation("email must be an email".into()))
    }
}

pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(AuthError::Validation(format!(
            "password must be longer than or equal to {MIN_PASSWORD_LEN} characters"
        )))
    }
}

pub fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    validate_email(email)?;
    validate_password(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        for email in ["a@b.com", "first.last+tag@example.co.uk", "x_y@sub.domain.io"] {
            assert!(validate_email(email).is_ok(), "{email} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for email in ["", "plain", "a@", "@b.com", "a@b", "a b@c.com", "a@-b.com"] {
            assert!(validate_email(email).is_err(), "{email} should be invalid");
        }
    }

    #[test]
    fn enforces_minimum_password_length() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
        assert!(matches!(
            validate_credentials("a@b.com", "short"),
            Err(AuthError::Validation(_))
        ));
    }
}
