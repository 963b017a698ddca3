/// Password hashing and credential verification
///
/// Hashing uses bcrypt (salted, slow by construction); verification
/// compares against the stored hash in constant time inside bcrypt.
/// `NoSuchUser` and `WrongPassword` stay distinct here for logging;
/// the orchestrator collapses both into one generic invalid-credentials
/// outcome before anything reaches a client.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, ValidationError};
use crate::store::UserRecord;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

// Verified against when the email matches no account, so lookup misses
// cost the same as hash mismatches.
const PHANTOM_HASH: &str = "$2b$12$GhvWmNVjRW29ulnudl.LbuAnUtN/LRfe1JsBm1Xu6LE3059z5Tk8K";

/// Result of checking submitted credentials against the stored record.
#[derive(Debug)]
pub enum CredentialCheck {
    Match(Box<UserRecord>),
    NoSuchUser,
    WrongPassword,
}

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if:
/// - Password fails validation (too short, weak, etc.)
/// - Bcrypt hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Errors
/// Returns error if verification fails
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Check submitted credentials against an optional stored record.
///
/// `record` is the result of the email lookup; absent records still run
/// a bcrypt verification against a phantom hash to keep response timing
/// indistinguishable from a wrong password.
pub fn check_credentials(
    record: Option<UserRecord>,
    password: &str,
) -> Result<CredentialCheck, AppError> {
    match record {
        None => {
            let _ = verify(password, PHANTOM_HASH);
            Ok(CredentialCheck::NoSuchUser)
        }
        Some(user) => {
            if verify_password(password, &user.password_hash)? {
                Ok(CredentialCheck::Match(Box::new(user)))
            } else {
                Ok(CredentialCheck::WrongPassword)
            }
        }
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // Maximum length (bcrypt limitation and DoS prevention)
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}
