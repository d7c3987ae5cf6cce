use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Where the database lives: a full URL, or discrete parts that are handed
/// to the driver unescaped (passwords may contain `@`, `/`, `#`, `:`).
#[derive(Debug, Clone, Deserialize)]
pub enum DatabaseSource {
    Url(String),
    Parts {
        host: String,
        port: u16,
        user: String,
        password: String,
        name: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub source: DatabaseSource,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShodanConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub shodan: ShodanConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database = DatabaseConfig {
            source: database_source(&get)?,
            max_connections: parsed_or(&get, "DB_MAX_CONNECTIONS", 15),
            acquire_timeout_secs: parsed_or(&get, "DB_ACQUIRE_TIMEOUT_SECS", 30),
            query_timeout_secs: parsed_or(&get, "DB_QUERY_TIMEOUT_SECS", 10),
        };

        let jwt = JwtConfig {
            secret: required(&get, "JWT_SECRET_KEY")?,
        };

        let shodan = ShodanConfig {
            api_key: required(&get, "SHODAN_API_KEY")?,
            base_url: get("SHODAN_BASE_URL").unwrap_or_else(|| "https://api.shodan.io".into()),
            timeout_secs: parsed_or(&get, "SHODAN_TIMEOUT_SECS", 30),
        };

        Ok(Self {
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed_or(&get, "APP_PORT", 5055),
            database,
            jwt,
            shodan,
        })
    }
}

/// `DATABASE_URL` wins; otherwise the `DB_*` parts are used as-is.
fn database_source(get: &impl Fn(&str) -> Option<String>) -> anyhow::Result<DatabaseSource> {
    if let Some(url) = get("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
        return Ok(DatabaseSource::Url(url));
    }
    Ok(DatabaseSource::Parts {
        user: required(get, "DB_USER").context("set DATABASE_URL or DB_USER/DB_PASSWORD/DB_HOST")?,
        password: required(get, "DB_PASSWORD")?,
        host: required(get, "DB_HOST")?,
        port: parsed_or(get, "DB_PORT", 5432),
        name: get("DB_NAME").unwrap_or_else(|| "postgres".into()),
    })
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    let value = get(key).with_context(|| format!("{key} is not set"))?;
    if value.trim().is_empty() {
        anyhow::bail!("{key} is empty");
    }
    Ok(value)
}

fn parsed_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    get(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
