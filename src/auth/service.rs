/// Authentication orchestrator
///
/// Composes the credential verifier, the access token issuer, and the
/// token managers over the store and mail seams into the public flows:
/// register, login, refresh, logout, password reset, email verification.
/// Each flow is a short linear sequence with explicit failure exits;
/// expected failures come back as typed `AuthError` kinds, and only
/// infrastructure trouble (store unreachable, signing failure)
/// propagates as an unrecoverable error.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::jwt::{decode_claims_ignoring_expiry, generate_access_token};
use crate::auth::password::{check_credentials, hash_password, CredentialCheck};
use crate::auth::refresh_token::{
    find_token_owner, issue_refresh_token, revoke_all_user_tokens, revoke_refresh_token,
    rotate_refresh_token, RotateOutcome,
};
use crate::auth::single_use_token::{
    consume_single_use_token, issue_single_use_token, ConsumeOutcome,
};
use crate::configuration::{JwtSettings, TokenSettings};
use crate::email_client::EmailClient;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::store::{TokenPurpose, TokenStore, UserRecord, UserStore};
use crate::validators::{is_valid_email, is_valid_nickname};

/// Tokens handed out by login.
#[derive(Debug)]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// True once the account has logged in before; the client uses it to
    /// skip the first-run introduction.
    pub skip_intro: bool,
}

/// Tokens handed out by a successful refresh rotation.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    jwt: JwtSettings,
    lifetimes: TokenSettings,
    email: EmailClient,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        jwt: JwtSettings,
        lifetimes: TokenSettings,
        email: EmailClient,
    ) -> Self {
        Self {
            users,
            tokens,
            jwt,
            lifetimes,
            email,
        }
    }

    /// Create an account and mail its activation link.
    ///
    /// The account starts inactive; email verification activates it.
    /// Returns the new user id.
    pub async fn register(
        &self,
        email: &str,
        nickname: &str,
        password: &str,
    ) -> Result<Uuid, AppError> {
        let context = ErrorContext::new("user_registration");

        let email = is_valid_email(email)?;
        let nickname = is_valid_nickname(nickname)?;
        let password_hash = hash_password(password)?;

        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.clone(),
            nickname,
            password_hash,
            is_active: false,
            first_login: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        let user_id = user.id;
        self.users.create_user(user).await?;

        let token = issue_single_use_token(
            self.tokens.as_ref(),
            user_id,
            TokenPurpose::VerifyEmail,
            self.lifetimes.verify_email_token_expiry,
        )
        .await?;
        self.send_token_email(&email, TokenPurpose::VerifyEmail, &token)
            .await;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %user_id,
            "User registered; verification email queued"
        );

        Ok(user_id)
    }

    /// Consume an email-verification token and activate the account.
    pub async fn confirm_email(&self, token: &str) -> Result<(), AppError> {
        match consume_single_use_token(self.tokens.as_ref(), token, TokenPurpose::VerifyEmail)
            .await?
        {
            ConsumeOutcome::Consumed(user_id) => {
                self.users.set_active(user_id, true).await?;
                tracing::info!(user_id = %user_id, "Email verified; account activated");
                Ok(())
            }
            ConsumeOutcome::Expired => Err(AuthError::TokenExpired.into()),
            ConsumeOutcome::AlreadyUsed => Err(AuthError::TokenAlreadyUsed.into()),
            ConsumeOutcome::Unknown => Err(AuthError::TokenUnknown.into()),
        }
    }

    /// Authenticate with email and password, issuing both tokens.
    ///
    /// Unknown email and wrong password both collapse to
    /// `InvalidCredentials`; only an inactive account is reported
    /// distinctly, and only after the password matched.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, AppError> {
        let context = ErrorContext::new("user_login");

        let email = is_valid_email(email)?;
        let record = self.users.find_by_email(&email).await?;

        let user = match check_credentials(record, password)? {
            CredentialCheck::Match(user) => user,
            CredentialCheck::NoSuchUser => {
                tracing::warn!(request_id = %context.request_id, "Login for unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
            CredentialCheck::WrongPassword => {
                tracing::warn!(request_id = %context.request_id, "Login with wrong password");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !user.is_active {
            return Err(AuthError::UserInactive.into());
        }

        let skip_intro = !user.first_login;
        self.users.update_last_login(user.id, Utc::now()).await?;

        let access_token = generate_access_token(&user.id, &user.email, &self.jwt)?;
        let refresh_token = issue_refresh_token(
            self.tokens.as_ref(),
            user.id,
            self.lifetimes.refresh_token_expiry,
        )
        .await?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %user.id,
            "User logged in successfully"
        );

        Ok(LoginGrant {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_expiry,
            skip_intro,
        })
    }

    /// Rotate a refresh token and mint a fresh access token.
    ///
    /// An accompanying access token, if supplied, is checked for
    /// signature only (its expiry is the reason the client is here) and
    /// its subject must match the refresh token's owner.
    pub async fn refresh(
        &self,
        presented_refresh: &str,
        accompanying_access: Option<&str>,
    ) -> Result<TokenPair, AppError> {
        let context = ErrorContext::new("token_refresh");

        let outcome = rotate_refresh_token(
            self.tokens.as_ref(),
            presented_refresh,
            self.lifetimes.refresh_token_expiry,
        )
        .await?;

        let (refresh_token, user_id) = match outcome {
            RotateOutcome::Rotated { token, user_id } => (token, user_id),
            RotateOutcome::Reused { user_id } => {
                // Theft signal: every session of this user dies now.
                revoke_all_user_tokens(self.tokens.as_ref(), user_id).await?;
                return Err(AuthError::TokenReused.into());
            }
            RotateOutcome::Expired => return Err(AuthError::TokenExpired.into()),
            RotateOutcome::Unknown => return Err(AuthError::TokenUnknown.into()),
        };

        if let Some(access) = accompanying_access {
            let claims = decode_claims_ignoring_expiry(access, &self.jwt)?;
            if claims.user_id()? != user_id {
                tracing::warn!(
                    request_id = %context.request_id,
                    user_id = %user_id,
                    "Access token subject does not match refresh token owner"
                );
                return Err(AuthError::TokenMalformed.into());
            }
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::TokenUnknown)?;
        if !user.is_active {
            revoke_all_user_tokens(self.tokens.as_ref(), user_id).await?;
            return Err(AuthError::UserInactive.into());
        }

        let access_token = generate_access_token(&user.id, &user.email, &self.jwt)?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %user_id,
            "Token refreshed successfully"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_expiry,
        })
    }

    /// Revoke the presented refresh token; with `everywhere`, revoke all
    /// of its owner's tokens. Idempotent either way.
    pub async fn logout(&self, presented_refresh: &str, everywhere: bool) -> Result<(), AppError> {
        if everywhere {
            if let Some(user_id) = find_token_owner(self.tokens.as_ref(), presented_refresh).await?
            {
                revoke_all_user_tokens(self.tokens.as_ref(), user_id).await?;
                return Ok(());
            }
        }
        revoke_refresh_token(self.tokens.as_ref(), presented_refresh).await
    }

    /// Issue a password-reset token and mail the link.
    ///
    /// Answers identically whether or not the email belongs to an
    /// account; lookup misses are logged and swallowed.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        let context = ErrorContext::new("password_reset_request");

        let email = is_valid_email(email)?;
        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                tracing::info!(
                    request_id = %context.request_id,
                    "Password reset requested for unknown email"
                );
                return Ok(());
            }
        };

        let token = issue_single_use_token(
            self.tokens.as_ref(),
            user.id,
            TokenPurpose::PasswordReset,
            self.lifetimes.reset_token_expiry,
        )
        .await?;
        self.send_token_email(&email, TokenPurpose::PasswordReset, &token)
            .await;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %user.id,
            "Password reset email queued"
        );

        Ok(())
    }

    /// Consume a reset token and set the new password.
    ///
    /// On success every refresh token of the user is revoked, forcing
    /// re-login everywhere with the new password.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let context = ErrorContext::new("password_reset_confirm");

        // Validate and hash before consuming: a weak password must not
        // spend the link.
        let password_hash = hash_password(new_password)?;

        match consume_single_use_token(self.tokens.as_ref(), token, TokenPurpose::PasswordReset)
            .await?
        {
            ConsumeOutcome::Consumed(user_id) => {
                self.users
                    .update_password_hash(user_id, &password_hash)
                    .await?;
                revoke_all_user_tokens(self.tokens.as_ref(), user_id).await?;
                tracing::info!(
                    request_id = %context.request_id,
                    user_id = %user_id,
                    "Password reset completed; all sessions revoked"
                );
                Ok(())
            }
            ConsumeOutcome::Expired => Err(AuthError::TokenExpired.into()),
            ConsumeOutcome::AlreadyUsed => Err(AuthError::TokenAlreadyUsed.into()),
            ConsumeOutcome::Unknown => Err(AuthError::TokenUnknown.into()),
        }
    }

    /// Current-user lookup for the protected profile endpoint.
    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users.find_by_id(user_id).await?)
    }

    /// Fire-and-forget mail dispatch: failures are logged with the
    /// purpose, never returned.
    async fn send_token_email(&self, recipient: &str, purpose: TokenPurpose, token: &str) {
        if let Err(e) = self.email.send_token_email(recipient, purpose, token).await {
            tracing::error!(
                purpose = purpose.as_str(),
                error = %e,
                "Failed to send token email"
            );
        }
    }
}
