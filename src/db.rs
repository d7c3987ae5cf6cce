use std::{future::Future, str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use tracing::{error, info};

use crate::config::{DatabaseConfig, DatabaseSource};

/// Failure of the credential store, split so callers can tell an outage
/// (worth retrying) from a rejected write or a broken query.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateIdentity,
    #[error("database unavailable: {0}")]
    Unavailable(String),
    #[error("database query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateIdentity,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
            _ => StoreError::Query(e.to_string()),
        }
    }
}

/// Bounds a store operation; running out of time counts as an outage.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(StoreError::from),
        Err(_) => Err(StoreError::Unavailable(format!(
            "query timed out after {}s",
            limit.as_secs()
        ))),
    }
}

pub fn connect_options(cfg: &DatabaseConfig) -> anyhow::Result<PgConnectOptions> {
    let options = match &cfg.source {
        DatabaseSource::Url(url) => PgConnectOptions::from_str(url).context("parse database url")?,
        DatabaseSource::Parts {
            host,
            port,
            user,
            password,
            name,
        } => PgConnectOptions::new()
            .host(host)
            .port(*port)
            .username(user)
            .password(password)
            .database(name),
    };
    Ok(options.application_name("hostwatch"))
}

pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let options = connect_options(cfg)?;

    let db = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(cfg.acquire_timeout())
        .max_lifetime(Duration::from_secs(30 * 60))
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .context("connect to database")?;
    Ok(db)
}

pub async fn ping(db: &PgPool, limit: Duration) -> Result<(), StoreError> {
    with_timeout(limit, sqlx::query("SELECT 1").execute(db)).await?;
    Ok(())
}

/// Probe the connection and bring the schema up to date; any failure aborts startup.
pub async fn initialize(db: &PgPool, limit: Duration) -> anyhow::Result<()> {
    if let Err(e) = ping(db, limit).await {
        error!(error = %e, "database connection test failed");
        return Err(e).context("database connection test");
    }
    info!("database connection test successful");

    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    info!("database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_unavailable() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn io_failure_is_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            StoreError::from(sqlx::Error::Io(io)),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn missing_row_is_a_query_error() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
    }

    fn config(source: DatabaseSource) -> DatabaseConfig {
        DatabaseConfig {
            source,
            max_connections: 1,
            acquire_timeout_secs: 1,
            query_timeout_secs: 1,
        }
    }

    #[test]
    fn parts_with_reserved_characters_are_not_reparsed() {
        let opts = connect_options(&config(DatabaseSource::Parts {
            host: "db.internal".into(),
            port: 5432,
            user: "app".into(),
            password: "p@ss/w#rd".into(),
            name: "postgres".into(),
        }))
        .unwrap();
        assert_eq!(opts.get_host(), "db.internal");
        assert_eq!(opts.get_port(), 5432);
        assert_eq!(opts.get_username(), "app");
        assert_eq!(opts.get_database(), Some("postgres"));
        assert_eq!(opts.get_application_name(), Some("hostwatch"));
    }

    #[test]
    fn url_source_is_parsed() {
        let opts = connect_options(&config(DatabaseSource::Url(
            "postgres://u:p@h:6543/d".into(),
        )))
        .unwrap();
        assert_eq!(opts.get_host(), "h");
        assert_eq!(opts.get_port(), 6543);
        assert_eq!(opts.get_database(), Some("d"));
        assert!(connect_options(&config(DatabaseSource::Url("not a url".into()))).is_err());
    }

    #[tokio::test]
    async fn slow_query_times_out_as_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, sqlx::Error>(())
        };
        let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
