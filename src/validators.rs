/// Input validators for the authentication surface
///
/// Features:
/// 1. DoS Protection: Input length limits
/// 2. Data Theft Protection: control character and null byte rejection
/// 3. Phishing Protection: Email validation

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MAX_NICKNAME_LENGTH: usize = 64;
const MIN_EMAIL_LENGTH: usize = 5; // Minimum valid email length
const MIN_NICKNAME_LENGTH: usize = 1;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();
}

/// Validates an email address and normalizes it to lowercase.
///
/// Email uniqueness is case-insensitive; every lookup and insert goes
/// through the lowercased form returned here.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    if has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a nickname.
pub fn is_valid_nickname(nickname: &str) -> Result<String, ValidationError> {
    let trimmed = nickname.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("nickname".to_string()));
    }

    if trimmed.len() < MIN_NICKNAME_LENGTH {
        return Err(ValidationError::TooShort(
            "nickname".to_string(),
            MIN_NICKNAME_LENGTH,
        ));
    }

    if trimmed.len() > MAX_NICKNAME_LENGTH {
        return Err(ValidationError::TooLong(
            "nickname".to_string(),
            MAX_NICKNAME_LENGTH,
        ));
    }

    if has_suspicious_nickname_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("nickname".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Detects suspicious patterns in email addresses that might indicate phishing
fn has_suspicious_email_patterns(email: &str) -> bool {
    // Extremely long local part (before @) is a phishing indicator
    if let Some(at_pos) = email.find('@') {
        let local_part = &email[..at_pos];
        if local_part.len() > 64 {
            return true;
        }
    }

    if email.matches('@').count() != 1 {
        return true;
    }

    if email.contains('\0') {
        return true;
    }

    false
}

/// Detects suspicious patterns in nicknames
fn has_suspicious_nickname_patterns(nickname: &str) -> bool {
    if nickname.contains('\0') {
        return true;
    }

    if nickname.chars().any(|c| c.is_control()) {
        return true;
    }

    false
}
