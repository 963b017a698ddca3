/// Service-level tests for the authentication core, run against the
/// in-memory store. The concurrency properties (single rotation winner,
/// single-shot consumption) are exercised with spawned tasks on a
/// multi-threaded runtime.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use authcore::auth::{
    consume_single_use_token, hash_password, issue_single_use_token, validate_access_token,
    AuthService, ConsumeOutcome,
};
use authcore::configuration::{EmailSettings, JwtSettings, TokenSettings};
use authcore::email_client::EmailClient;
use authcore::error::{AppError, AuthError};
use authcore::store::{MemoryStore, TokenPurpose, UserRecord, UserStore};

fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: "test-secret-key-at-least-32-characters-long".to_string(),
        access_token_expiry: 900,
        issuer: "authcore-test".to_string(),
    }
}

fn token_settings() -> TokenSettings {
    TokenSettings {
        refresh_token_expiry: 3600,
        reset_token_expiry: 600,
        verify_email_token_expiry: 600,
    }
}

fn email_client() -> EmailClient {
    // Port 9 refuses connections; sends fail and are logged, which is
    // exactly the fire-and-forget contract under test.
    EmailClient::new(
        EmailSettings {
            relay_url: "http://127.0.0.1:9".to_string(),
            sender: "noreply@example.com".to_string(),
            link_base_url: "https://app.example.com".to_string(),
        },
        reqwest::Client::new(),
    )
}

fn build_service(store: &MemoryStore) -> AuthService {
    let store = Arc::new(store.clone());
    AuthService::new(
        store.clone(),
        store,
        jwt_settings(),
        token_settings(),
        email_client(),
    )
}

async fn seed_active_user(store: &MemoryStore, email: &str, password: &str) -> Uuid {
    let user = UserRecord {
        id: Uuid::new_v4(),
        email: email.to_string(),
        nickname: "tester".to_string(),
        password_hash: hash_password(password).expect("Failed to hash password"),
        is_active: true,
        first_login: true,
        created_at: Utc::now(),
        last_login_at: None,
    };
    let id = user.id;
    store.create_user(user).await.expect("Failed to seed user");
    id
}

fn is_auth_error(result: &Result<impl std::fmt::Debug, AppError>, kind: AuthError) -> bool {
    matches!(result, Err(AppError::Auth(k)) if *k == kind)
}

// --- Login ---

#[tokio::test]
async fn login_succeeds_with_valid_credentials() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    let user_id = seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let grant = service
        .login("a@x.com", "CorrectHorse1")
        .await
        .expect("Login failed");

    assert!(!grant.refresh_token.is_empty());
    assert_eq!(grant.expires_in, 900);

    // The freshly minted access token validates right away.
    let claims = validate_access_token(&grant.access_token, &jwt_settings())
        .expect("Fresh access token must validate");
    assert_eq!(claims.user_id().unwrap(), user_id);
    assert_eq!(claims.email, "a@x.com");
}

#[tokio::test]
async fn login_collapses_unknown_email_and_wrong_password() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let unknown = service.login("nobody@x.com", "CorrectHorse1").await;
    let wrong = service.login("a@x.com", "WrongHorse1").await;

    assert!(is_auth_error(&unknown, AuthError::InvalidCredentials));
    assert!(is_auth_error(&wrong, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn login_rejects_inactive_account() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    let id = seed_active_user(&store, "a@x.com", "CorrectHorse1").await;
    store.set_active(id, false).await.unwrap();

    let result = service.login("a@x.com", "CorrectHorse1").await;
    assert!(is_auth_error(&result, AuthError::UserInactive));
}

#[tokio::test]
async fn login_reports_first_login_then_clears_it() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let first = service.login("a@x.com", "CorrectHorse1").await.unwrap();
    assert!(!first.skip_intro);

    let second = service.login("a@x.com", "CorrectHorse1").await.unwrap();
    assert!(second.skip_intro);
}

#[tokio::test]
async fn login_is_case_insensitive_on_email() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    assert!(service.login("A@X.COM", "CorrectHorse1").await.is_ok());
}

// --- Refresh rotation ---

#[tokio::test]
async fn refresh_rotates_and_detects_replay() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let grant = service.login("a@x.com", "CorrectHorse1").await.unwrap();

    let pair = service
        .refresh(&grant.refresh_token, None)
        .await
        .expect("Refresh failed");
    assert_ne!(pair.refresh_token, grant.refresh_token);

    // Replaying the rotated-out token is the theft signal and takes the
    // whole session down with it.
    let replay = service.refresh(&grant.refresh_token, None).await;
    assert!(is_auth_error(&replay, AuthError::TokenReused));

    let after = service.refresh(&pair.refresh_token, None).await;
    assert!(matches!(after, Err(AppError::Auth(_))));
}

#[tokio::test]
async fn refresh_accepts_expired_accompanying_access_token() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    let user_id = seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let grant = service.login("a@x.com", "CorrectHorse1").await.unwrap();

    // Mint an already-expired access token for the same user with the
    // same signing secret.
    let mut expired_config = jwt_settings();
    expired_config.access_token_expiry = -120;
    let expired_access =
        authcore::auth::generate_access_token(&user_id, "a@x.com", &expired_config).unwrap();

    let pair = service
        .refresh(&grant.refresh_token, Some(&expired_access))
        .await
        .expect("Refresh with expired access token failed");
    assert!(!pair.access_token.is_empty());
}

#[tokio::test]
async fn refresh_rejects_access_token_of_other_user() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;
    let other_id = seed_active_user(&store, "b@x.com", "CorrectHorse1").await;

    let grant = service.login("a@x.com", "CorrectHorse1").await.unwrap();
    let foreign_access =
        authcore::auth::generate_access_token(&other_id, "b@x.com", &jwt_settings()).unwrap();

    let result = service.refresh(&grant.refresh_token, Some(&foreign_access)).await;
    assert!(is_auth_error(&result, AuthError::TokenMalformed));
}

#[tokio::test]
async fn refresh_with_unknown_token_is_rejected() {
    let store = MemoryStore::new();
    let service = build_service(&store);

    let result = service.refresh("never-issued-token-value", None).await;
    assert!(is_auth_error(&result, AuthError::TokenUnknown));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rotations_have_exactly_one_winner() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let grant = service.login("a@x.com", "CorrectHorse1").await.unwrap();

    let s1 = service.clone();
    let s2 = service.clone();
    let t1 = grant.refresh_token.clone();
    let t2 = grant.refresh_token.clone();

    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { s1.refresh(&t1, None).await }),
        tokio::spawn(async move { s2.refresh(&t2, None).await }),
    );
    let results = [r1.unwrap(), r2.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let reused = results
        .iter()
        .filter(|r| is_auth_error(r, AuthError::TokenReused))
        .count();

    assert_eq!(winners, 1, "exactly one rotation may succeed");
    assert_eq!(reused, 1, "the loser must observe reuse");
}

// --- Logout ---

#[tokio::test]
async fn logout_then_refresh_is_rejected() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let grant = service.login("a@x.com", "CorrectHorse1").await.unwrap();
    service.logout(&grant.refresh_token, false).await.unwrap();

    let result = service.refresh(&grant.refresh_token, None).await;
    assert!(is_auth_error(&result, AuthError::TokenUnknown));
}

#[tokio::test]
async fn logout_everywhere_kills_all_sessions() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let first = service.login("a@x.com", "CorrectHorse1").await.unwrap();
    let second = service.login("a@x.com", "CorrectHorse1").await.unwrap();

    service.logout(&second.refresh_token, true).await.unwrap();

    assert!(service.refresh(&first.refresh_token, None).await.is_err());
    assert!(service.refresh(&second.refresh_token, None).await.is_err());
}

#[tokio::test]
async fn logout_is_idempotent_and_accepts_unknown_tokens() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let grant = service.login("a@x.com", "CorrectHorse1").await.unwrap();
    service.logout(&grant.refresh_token, false).await.unwrap();
    service.logout(&grant.refresh_token, false).await.unwrap();
    service.logout("never-issued", false).await.unwrap();
    service.logout("never-issued", true).await.unwrap();
}

// --- Password reset ---

#[tokio::test]
async fn reset_request_is_silent_for_unknown_email() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    // Both calls must succeed indistinguishably.
    service.request_password_reset("a@x.com").await.unwrap();
    service.request_password_reset("ghost@x.com").await.unwrap();
}

#[tokio::test]
async fn reset_confirm_sets_password_and_revokes_sessions() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    let user_id = seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let grant = service.login("a@x.com", "CorrectHorse1").await.unwrap();

    let token = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
        .await
        .unwrap();
    service
        .confirm_password_reset(&token, "BrandNewPass1")
        .await
        .expect("Reset confirm failed");

    // Old password dead, new password live.
    assert!(service.login("a@x.com", "CorrectHorse1").await.is_err());
    assert!(service.login("a@x.com", "BrandNewPass1").await.is_ok());

    // Every standing session died with the reset.
    assert!(service.refresh(&grant.refresh_token, None).await.is_err());
}

#[tokio::test]
async fn reset_link_works_exactly_once() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    let user_id = seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let token = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
        .await
        .unwrap();

    service
        .confirm_password_reset(&token, "BrandNewPass1")
        .await
        .unwrap();
    let again = service.confirm_password_reset(&token, "OtherNewPass1").await;
    assert!(is_auth_error(&again, AuthError::TokenAlreadyUsed));
}

#[tokio::test]
async fn weak_password_does_not_spend_the_link() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    let user_id = seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let token = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
        .await
        .unwrap();

    let weak = service.confirm_password_reset(&token, "weak").await;
    assert!(matches!(weak, Err(AppError::Validation(_))));

    // The link is still valid for a proper password.
    assert!(service
        .confirm_password_reset(&token, "BrandNewPass1")
        .await
        .is_ok());
}

#[tokio::test]
async fn new_reset_token_invalidates_previous_one() {
    let store = MemoryStore::new();
    let service = build_service(&store);
    let user_id = seed_active_user(&store, "a@x.com", "CorrectHorse1").await;

    let first = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
        .await
        .unwrap();
    let second = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
        .await
        .unwrap();

    let stale = service.confirm_password_reset(&first, "BrandNewPass1").await;
    assert!(is_auth_error(&stale, AuthError::TokenAlreadyUsed));

    assert!(service
        .confirm_password_reset(&second, "BrandNewPass1")
        .await
        .is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumption_succeeds_exactly_once() {
    let store = MemoryStore::new();
    let user_id = Uuid::new_v4();

    let token = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            consume_single_use_token(&store, &token, TokenPurpose::PasswordReset).await
        }));
    }

    let mut consumed = 0;
    let mut already_used = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ConsumeOutcome::Consumed(id) => {
                assert_eq!(id, user_id);
                consumed += 1;
            }
            ConsumeOutcome::AlreadyUsed => already_used += 1,
            other => panic!("Unexpected outcome under contention: {:?}", other),
        }
    }

    assert_eq!(consumed, 1, "exactly one caller may consume the token");
    assert_eq!(already_used, 7);
}

// --- Registration and email verification ---

#[tokio::test]
async fn registered_account_is_inactive_until_verified() {
    let store = MemoryStore::new();
    let service = build_service(&store);

    let user_id = service
        .register("new@x.com", "Newcomer", "FreshStart1")
        .await
        .expect("Registration failed");

    let before = service.login("new@x.com", "FreshStart1").await;
    assert!(is_auth_error(&before, AuthError::UserInactive));

    // Stand in for the mailed link (supersedes the one issued at
    // registration).
    let token = issue_single_use_token(&store, user_id, TokenPurpose::VerifyEmail, 600)
        .await
        .unwrap();
    service.confirm_email(&token).await.unwrap();

    assert!(service.login("new@x.com", "FreshStart1").await.is_ok());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let store = MemoryStore::new();
    let service = build_service(&store);

    service
        .register("new@x.com", "Newcomer", "FreshStart1")
        .await
        .unwrap();
    let duplicate = service.register("new@x.com", "Imposter", "FreshStart1").await;
    assert!(matches!(duplicate, Err(AppError::Database(_))));
}

#[tokio::test]
async fn verification_link_is_single_use() {
    let store = MemoryStore::new();
    let service = build_service(&store);

    let user_id = service
        .register("new@x.com", "Newcomer", "FreshStart1")
        .await
        .unwrap();
    let token = issue_single_use_token(&store, user_id, TokenPurpose::VerifyEmail, 600)
        .await
        .unwrap();

    service.confirm_email(&token).await.unwrap();
    let again = service.confirm_email(&token).await;
    assert!(is_auth_error(&again, AuthError::TokenAlreadyUsed));
}
