use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::User;
use crate::db::{self, StoreError};

/// Credential store. Email uniqueness is owned by the storage layer, so
/// `create` reports `DuplicateIdentity` straight from the insert.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: i32) -> Result<Option<User>, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
    query_timeout: Duration,
}

impl PgUserStore {
    pub fn new(db: PgPool, query_timeout: Duration) -> Self {
        Self { db, query_timeout }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        db::with_timeout(
            self.query_timeout,
            sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (email, password_hash)
                VALUES ($1, $2)
                RETURNING id, email, password_hash, created_at
                "#,
            )
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.db),
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        db::with_timeout(
            self.query_timeout,
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, password_hash, created_at
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(email)
            .fetch_optional(&self.db),
        )
        .await
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        db::with_timeout(
            self.query_timeout,
            sqlx::query_as::<_, User>(
                r#"SELECT id, email, password_hash, created_at FROM users WHERE id = $1"#,
            )
            .bind(id)
            .fetch_optional(&self.db),
        )
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        db::ping(&self.db, self.query_timeout).await
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::Mutex;

    use super::*;

    /// In-process store for tests. The whole map sits behind one lock, which
    /// makes the duplicate check and the insert a single step.
    #[derive(Default)]
    pub struct MemoryUserStore {
        users: Mutex<Vec<User>>,
        down: AtomicBool,
    }

    impl MemoryUserStore {
        pub fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        pub async fn count_by_email(&self, email: &str) -> usize {
            self.users.lock().await.iter().filter(|u| u.email == email).count()
        }

        pub async fn create_user(&self, email: &str, password: &str) -> User {
            let hash = crate::auth::password::hash_password(password).expect("hash");
            self.create(email, &hash).await.expect("create user")
        }

        pub async fn remove(&self, id: i32) {
            self.users.lock().await.retain(|u| u.id != id);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
            self.check()?;
            let mut users = self.users.lock().await;
            if users.iter().any(|u| u.email == email) {
                return Err(StoreError::DuplicateIdentity);
            }
            let user = User {
                id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                created_at: time::OffsetDateTime::now_utc(),
            };
            users.push(user.clone());
            Ok(user)
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.check()?;
            Ok(self.users.lock().await.iter().find(|u| u.email == email).cloned())
        }

        async fn find_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
            self.check()?;
            Ok(self.users.lock().await.iter().find(|u| u.id == id).cloned())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.check()
        }
    }

    #[tokio::test]
    async fn create_rejects_second_email_and_keeps_one_record() {
        let store = MemoryUserStore::default();
        let first = store.create("a@x.com", "h1").await.expect("first insert");
        let err = store.create("a@x.com", "h2").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIdentity));
        assert_eq!(store.count_by_email("a@x.com").await, 1);

        let found = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.password_hash, "h1");
    }

    #[tokio::test]
    async fn concurrent_creates_admit_exactly_one() {
        let store = std::sync::Arc::new(MemoryUserStore::default());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create("race@x.com", &format!("h{i}")).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.count_by_email("race@x.com").await, 1);
    }

    #[tokio::test]
    async fn outage_is_reported_as_unavailable() {
        let store = MemoryUserStore::default();
        store.set_down(true);
        assert!(matches!(
            store.find_by_id(1).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
