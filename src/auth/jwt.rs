/// Access token issuance and validation
///
/// Tokens are HMAC-signed (HS256) with a process-wide secret injected via
/// `JwtSettings` at startup; there is no server-side state for them.
/// Validation failures map to distinct kinds so callers can tell
/// "try refreshing" (`TokenExpired`) apart from "reject outright"
/// (`TokenMalformed` / `TokenBadSignature`).

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Generate a new access token for a user
///
/// # Errors
/// Returns error if token generation fails
pub fn generate_access_token(
    user_id: &Uuid,
    email: &str,
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = Claims::new(
        *user_id,
        email.to_string(),
        config.access_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate an access token and extract its claims
///
/// # Errors
/// * `TokenExpired` - signature is fine but the expiry has passed
/// * `TokenBadSignature` - the signature does not verify
/// * `TokenMalformed` - anything else (structure, issuer, claim types)
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        let kind = classify(&e);
        tracing::warn!(error = %e, kind = %kind, "Access token validation failed");
        AppError::Auth(kind)
    })
}

/// Validate only the signature and structure, ignoring expiry.
///
/// Used by the refresh flow: an expired access token may accompany a
/// refresh request to cross-check identity claims, but it is never
/// trusted beyond that.
pub fn decode_claims_ignoring_expiry(
    token: &str,
    config: &JwtSettings,
) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.validate_exp = false;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        let kind = classify(&e);
        tracing::warn!(error = %e, kind = %kind, "Accompanying access token rejected");
        AppError::Auth(kind)
    })
}

fn classify(error: &jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;

    match error.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::TokenBadSignature,
        _ => AuthError::TokenMalformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 3600,
            issuer: "test".to_string(),
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();
        let email = "test@example.com";

        let token =
            generate_access_token(&user_id, email, &config).expect("Failed to generate token");
        let claims = validate_access_token(&token, &config).expect("Failed to validate token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, email);
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_malformed_token() {
        let config = get_test_config();
        let result = validate_access_token("not-even-a-jwt", &config);

        match result {
            Err(AppError::Auth(AuthError::TokenMalformed)) => (),
            other => panic!("Expected TokenMalformed, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_token_maps_to_expired_kind() {
        let mut config = get_test_config();
        // Well past the default decoder leeway.
        config.access_token_expiry = -120;
        let token = generate_access_token(&Uuid::new_v4(), "test@example.com", &config)
            .expect("Failed to generate token");

        match validate_access_token(&token, &config) {
            Err(AppError::Auth(AuthError::TokenExpired)) => (),
            other => panic!("Expected TokenExpired, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_token_accepted_when_expiry_ignored() {
        let mut config = get_test_config();
        config.access_token_expiry = -120;
        let user_id = Uuid::new_v4();
        let token = generate_access_token(&user_id, "test@example.com", &config)
            .expect("Failed to generate token");

        let claims =
            decode_claims_ignoring_expiry(&token, &config).expect("Signature-only decode failed");
        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn test_tampered_token_is_bad_signature() {
        let config = get_test_config();
        let token = generate_access_token(&Uuid::new_v4(), "test@example.com", &config)
            .expect("Failed to generate token");

        // Flip the signature segment.
        let tampered = format!("{}AAAA", token);
        match validate_access_token(&tampered, &config) {
            Err(AppError::Auth(AuthError::TokenBadSignature))
            | Err(AppError::Auth(AuthError::TokenMalformed)) => (),
            other => panic!("Expected signature rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_secret_rejected_even_without_expiry_check() {
        let config = get_test_config();
        let token = generate_access_token(&Uuid::new_v4(), "test@example.com", &config)
            .expect("Failed to generate token");

        let mut other = get_test_config();
        other.secret = "a-completely-different-signing-secret-value".to_string();
        assert!(decode_claims_ignoring_expiry(&token, &other).is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let mut config = get_test_config();
        let token = generate_access_token(&Uuid::new_v4(), "test@example.com", &config)
            .expect("Failed to generate token");

        config.issuer = "wrong-issuer".to_string();
        assert!(validate_access_token(&token, &config).is_err());
    }
}
