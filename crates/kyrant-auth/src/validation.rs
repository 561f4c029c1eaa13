//! Credential checks performed before contacting the provider.

use crate::{AuthError, AuthResult};
use regex::Regex;
use std::sync::OnceLock;

pub const MIN_PASSWORD_LEN: usize = 6;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
    })
}

pub fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::InvalidInput("Email is required".to_string()));
    }
    if !email_pattern().is_match(email) {
        return Err(AuthError::InvalidInput(
            "Please enter a valid email address".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.is_empty() {
        return Err(AuthError::InvalidInput("Password is required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    validate_email(email)?;
    validate_password(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_credentials() {
        assert!(validate_credentials("ada@example.com", "hunter22").is_ok());
        assert!(validate_email("  ada@example.co.uk ").is_ok());
    }

    #[test]
    fn test_rejects_bad_email() {
        for email in ["", "ada", "ada@", "@example.com", "ada@example", "a da@example.com"] {
            assert!(
                matches!(validate_email(email), Err(AuthError::InvalidInput(_))),
                "accepted {:?}",
                email
            );
        }
    }

    #[test]
    fn test_rejects_short_password() {
        assert!(validate_password("").is_err());
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }
}
