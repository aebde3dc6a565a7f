/// Password Hashing and Verification
///
/// bcrypt hashing plus a configurable strength policy. Both operations are
/// CPU-bound; async callers should run them on the blocking pool.

use bcrypt::{hash, verify};

use crate::configuration::PasswordSettings;
use crate::error::{AuthError, ValidationError};

// bcrypt only looks at the first 72 bytes; anything far beyond that is abuse.
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    min_length: usize,
    require_mixed_case_and_digit: bool,
}

impl PasswordHasher {
    pub fn new(settings: &PasswordSettings) -> Self {
        Self {
            cost: settings.hash_cost,
            min_length: settings.min_length,
            require_mixed_case_and_digit: settings.require_mixed_case_and_digit,
        }
    }

    /// Validate `password` against the policy and hash it
    ///
    /// # Errors
    /// - `AuthError::Validation` if the password fails the policy
    /// - `AuthError::HashingFailure` if bcrypt fails
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        self.validate_strength(password)?;

        hash(password, self.cost).map_err(|e| AuthError::HashingFailure(e.to_string()))
    }

    /// Check a password against a stored bcrypt hash
    ///
    /// # Errors
    /// Returns `AuthError::HashingFailure` if the stored hash is unreadable
    pub fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool, AuthError> {
        verify(password, password_hash).map_err(|e| AuthError::HashingFailure(e.to_string()))
    }

    fn validate_strength(&self, password: &str) -> Result<(), ValidationError> {
        if password.is_empty() {
            return Err(ValidationError::EmptyField("password".to_string()));
        }

        if password.len() < self.min_length {
            return Err(ValidationError::TooShort(
                "password".to_string(),
                self.min_length,
            ));
        }

        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(ValidationError::TooLong(
                "password".to_string(),
                MAX_PASSWORD_LENGTH,
            ));
        }

        if self.require_mixed_case_and_digit {
            let has_digit = password.chars().any(|c| c.is_numeric());
            let has_lowercase = password.chars().any(|c| c.is_lowercase());
            let has_uppercase = password.chars().any(|c| c.is_uppercase());

            if !has_digit || !has_lowercase || !has_uppercase {
                return Err(ValidationError::InvalidFormat(
                    "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}
