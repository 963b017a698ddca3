/// Authentication Routes
///
/// Thin handlers over the `AuthService`: registration, login, token
/// refresh, logout, password reset, email verification, and current
/// user information. Handlers relay the service's verdicts as HTTP
/// responses; link-based flows collapse every failure kind to one
/// generic message.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims};
use crate::error::AppError;

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
///
/// The access token is optional; when present its signature is checked
/// against the refresh token's owner.
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub access_token: Option<String>,
}

/// Logout request
#[derive(Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
    #[serde(default)]
    pub everywhere: bool,
}

/// Password reset request
#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Password reset confirmation
#[derive(Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_intro: Option<bool>,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub nickname: String,
    pub created_at: String,
}

/// POST /auth/register
///
/// Create an account and send its activation link. No tokens are
/// returned; the account stays inactive until the email is verified.
///
/// # Errors
/// - 400: Validation errors (invalid email/password/nickname)
/// - 409: Email already registered (duplicate)
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service
        .register(&form.email, &form.nickname, &form.password)
        .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Account created. Check your inbox to activate it."
    })))
}

/// GET /auth/verify-email?token=...
///
/// Consume an email-verification link and activate the account.
/// Every failure kind collapses to the same generic response.
pub async fn verify_email(
    query: web::Query<VerifyEmailQuery>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    match service.confirm_email(&query.token).await {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Email verified. You can log in now."
        }))),
        Err(AppError::Auth(kind)) => {
            tracing::warn!(kind = %kind, "Email verification link rejected");
            Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid or expired link"
            })))
        }
        Err(e) => Err(e),
    }
}

/// POST /auth/login
///
/// Authenticate user with email and password.
/// Returns access token, refresh token, and the skip-intro flag.
///
/// # Errors
/// - 400: Validation error (invalid email format)
/// - 401: Invalid credentials (email not found or wrong password)
/// - 403: Account is inactive
/// - 500: Internal server error
///
/// # Security Notes
/// - Uses same error message for "not found" and "wrong password"
/// - Prevents user enumeration attacks
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let grant = service.login(&form.email, &form.password).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: grant.expires_in,
        skip_intro: Some(grant.skip_intro),
    }))
}

/// POST /auth/refresh
///
/// Rotate the refresh token and mint a new access token.
///
/// # Token Rotation Security
/// - The presented refresh token is revoked and linked to its replacement
/// - Replaying a rotated-out token revokes the whole session chain and
///   forces a full re-login
///
/// # Errors
/// - 401: Invalid, expired, revoked, or reused refresh token
/// - 403: Associated account is inactive
/// - 500: Internal server error
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = service
        .refresh(&form.refresh_token, form.access_token.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: pair.expires_in,
        skip_intro: None,
    }))
}

/// POST /auth/logout
///
/// Revoke the presented refresh token; `everywhere` revokes every
/// session of its owner. Succeeds even for unknown tokens.
pub async fn logout(
    form: web::Json<LogoutRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service.logout(&form.refresh_token, form.everywhere).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out"
    })))
}

/// POST /auth/password-reset/request
///
/// Issue a reset link for the address, answering identically whether or
/// not an account exists behind it.
pub async fn request_password_reset(
    form: web::Json<PasswordResetRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service.request_password_reset(&form.email).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "If that address has an account, a reset link is on its way."
    })))
}

/// POST /auth/password-reset/confirm
///
/// Consume the reset link and set the new password. All sessions of the
/// user are revoked on success. Failure kinds collapse to one generic
/// message; the precise kind lives in the logs.
pub async fn confirm_password_reset(
    form: web::Json<PasswordResetConfirmRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    match service
        .confirm_password_reset(&form.token, &form.new_password)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Password updated. Log in with your new password."
        }))),
        Err(AppError::Auth(kind)) => {
            tracing::warn!(kind = %kind, "Password reset link rejected");
            Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid or expired link"
            })))
        }
        Err(e) => Err(e),
    }
}

/// GET /auth/me
///
/// Get current authenticated user's information.
/// **Requires valid access token** in Authorization header; claims are
/// injected by the JWT middleware.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 404: User not found (should not happen if token is valid)
/// - 500: Internal server error
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = service
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::Database(crate::error::DatabaseError::NotFound(
            "Record not found".to_string(),
        )))?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.id.to_string(),
        email: user.email,
        nickname: user.nickname,
        created_at: user.created_at.to_rfc3339(),
    }))
}
