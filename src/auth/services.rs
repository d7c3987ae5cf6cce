use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        password::{hash_password_blocking, verify_password_blocking},
        repo::UserStore,
        repo_types::User,
    },
    db::StoreError,
    error::AppError,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

/// Validates input, hashes the password and inserts the user. Duplicate
/// emails are caught by the store's unique constraint.
pub async fn register_user(
    store: &dyn UserStore,
    email: Option<String>,
    password: Option<String>,
) -> Result<User, AppError> {
    let (Some(email), Some(password)) = (present(email), present(password)) else {
        return Err(AppError::Validation("Email and password are required".into()));
    };
    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    let hash = hash_password_blocking(password).await?;

    match store.create(&email, &hash).await {
        Ok(user) => {
            info!(user_id = user.id, email = %user.email, "user registered");
            Ok(user)
        }
        Err(StoreError::DuplicateIdentity) => {
            warn!(email = %email, "email already registered");
            Err(AppError::Conflict("Email already registered".into()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Checks credentials. Unknown email and wrong password are indistinguishable
/// to the caller.
pub async fn authenticate(
    store: &dyn UserStore,
    email: Option<String>,
    password: Option<String>,
) -> Result<User, AppError> {
    let (Some(email), Some(password)) = (present(email), present(password)) else {
        return Err(AppError::InvalidCredentials);
    };
    let email = normalize_email(&email);

    let user = match store.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !verify_password_blocking(password, user.password_hash.clone()).await? {
        warn!(email = %email, user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::memory::MemoryUserStore;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let store = MemoryUserStore::default();
        let created = register_user(&store, Some("a@x.com".into()), Some("pw123".into()))
            .await
            .expect("register");
        let user = authenticate(&store, Some("A@x.com".into()), Some("pw123".into()))
            .await
            .expect("login");
        assert_eq!(user.id, created.id);
        assert_ne!(user.password_hash, "pw123");
    }

    #[tokio::test]
    async fn missing_fields_are_validation_errors() {
        let store = MemoryUserStore::default();
        let err = register_user(&store, Some("a@x.com".into()), None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = register_user(&store, Some("   ".into()), Some("pw".into())).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn registration_canonicalizes_email_and_needs_a_real_password() {
        let store = MemoryUserStore::default();
        let err = register_user(&store, Some("a@x.com".into()), Some("  \t".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let user = register_user(&store, Some(" Mixed@Case.COM ".into()), Some("pw".into()))
            .await
            .unwrap();
        assert_eq!(user.email, "mixed@case.com");
        let err = register_user(&store, Some("MIXED@case.com".into()), Some("pw".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let store = MemoryUserStore::default();
        register_user(&store, Some("a@x.com".into()), Some("pw123".into()))
            .await
            .unwrap();
        let err = register_user(&store, Some("a@x.com".into()), Some("other".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.count_by_email("a@x.com").await, 1);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let store = MemoryUserStore::default();
        register_user(&store, Some("a@x.com".into()), Some("pw123".into()))
            .await
            .unwrap();
        let wrong = authenticate(&store, Some("a@x.com".into()), Some("nope".into()))
            .await
            .unwrap_err();
        let unknown = authenticate(&store, Some("b@x.com".into()), Some("pw123".into()))
            .await
            .unwrap_err();
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_store_error() {
        let store = MemoryUserStore::default();
        store.set_down(true);
        let err = authenticate(&store, Some("a@x.com".into()), Some("pw".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::Unavailable(_))));
    }
}
