//! Typed runtime settings read from environment variables.

mod dsn;
pub mod env;

pub use env::{parse_complex, parse_duration, Complex, Env, FromEnvValue};

use crate::query::QueryOptions;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid value for {name}: {message}")]
    Invalid { name: String, message: String },

    #[error("database driver is not configured (set DB_DRIVER)")]
    MissingDriver,

    #[error("unknown database driver: {0}")]
    UnknownDriver(String),
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    pub timezone: String,
    pub charset: String,
    /// File path for sqlite.
    pub path: String,
    pub max_connections: u32,
    /// Rebuild tables whose stamped version differs from the schema's.
    pub migrate: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            driver: String::new(),
            host: "localhost".into(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            name: String::new(),
            ssl_mode: "disable".into(),
            timezone: "UTC".into(),
            charset: "UTF8".into(),
            path: String::new(),
            max_connections: 10,
            migrate: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Shared store connection url. Empty means the process-local cache.
    pub url: String,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            ttl: Duration::from_secs(60),
        }
    }
}

impl CacheSettings {
    /// Zero ttl keeps entries until invalidated.
    pub fn ttl(&self) -> Option<Duration> {
        (!self.ttl.is_zero()).then_some(self.ttl)
    }
}

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub addr: String,
    pub body_limit: usize,
    pub timeout_get: Duration,
    pub timeout_post: Duration,
    pub timeout_put: Duration,
    pub timeout_delete: Duration,
    pub entities_dir: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".into(),
            body_limit: 2 * 1024 * 1024,
            timeout_get: Duration::from_secs(30),
            timeout_post: Duration::from_secs(30),
            timeout_put: Duration::from_secs(30),
            timeout_delete: Duration::from_secs(30),
            entities_dir: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub query: QueryOptions,
    pub server: ServerSettings,
    /// Fallback language for error messages.
    pub lang: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            cache: CacheSettings::default(),
            query: QueryOptions::default(),
            server: ServerSettings::default(),
            lang: "en".into(),
        }
    }
}

impl Settings {
    /// Read from the process environment, after loading `.env` when present.
    pub fn from_env() -> Result<Self, SettingsError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read from any lookup. Unset names keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env::new(lookup);
        let mut s = Settings::default();

        let db = &mut s.database;
        env.load("DB_DRIVER", &mut db.driver)?;
        env.load("DB_HOST", &mut db.host)?;
        env.load("DB_PORT", &mut db.port)?;
        env.load("DB_USER", &mut db.user)?;
        env.load("DB_PASSWORD", &mut db.password)?;
        env.load("DB_NAME", &mut db.name)?;
        env.load("DB_SSLMODE", &mut db.ssl_mode)?;
        env.load("DB_TIMEZONE", &mut db.timezone)?;
        env.load("DB_CHARSET", &mut db.charset)?;
        env.load("DB_PATH", &mut db.path)?;
        env.load("DB_MAX_CONNECTIONS", &mut db.max_connections)?;
        env.load("DB_MIGRATE", &mut db.migrate)?;

        env.load("CACHE_ENABLED", &mut s.cache.enabled)?;
        env.load("CACHE_URL", &mut s.cache.url)?;
        env.load("CACHE_TTL", &mut s.cache.ttl)?;

        env.load("QUERY_DEFAULT_PER_PAGE", &mut s.query.default_per_page)?;
        env.load("QUERY_MAX_PER_PAGE", &mut s.query.max_per_page)?;

        let srv = &mut s.server;
        env.load("APP_ADDR", &mut srv.addr)?;
        env.load("APP_BODY_LIMIT", &mut srv.body_limit)?;
        env.load("APP_TIMEOUT_GET", &mut srv.timeout_get)?;
        env.load("APP_TIMEOUT_POST", &mut srv.timeout_post)?;
        env.load("APP_TIMEOUT_PUT", &mut srv.timeout_put)?;
        env.load("APP_TIMEOUT_DELETE", &mut srv.timeout_delete)?;
        let mut dir = String::new();
        env.load("APP_ENTITIES_DIR", &mut dir)?;
        if !dir.is_empty() {
            srv.entities_dir = Some(PathBuf::from(dir));
        }

        env.load("APP_LANG", &mut s.lang)?;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.database.port, 5432);
        assert_eq!(s.query.default_per_page, 10);
        assert!(!s.cache.enabled);
        assert_eq!(s.server.entities_dir, None);
    }

    #[test]
    fn reads_typed_values() {
        let s = Settings::from_lookup(lookup(&[
            ("DB_DRIVER", "postgres"),
            ("DB_PORT", "6543"),
            ("DB_MIGRATE", "1"),
            ("CACHE_ENABLED", "true"),
            ("CACHE_TTL", "5m"),
            ("QUERY_MAX_PER_PAGE", "50"),
            ("APP_TIMEOUT_GET", "2s"),
            ("APP_ENTITIES_DIR", "./entities"),
        ]))
        .unwrap();
        assert_eq!(s.database.port, 6543);
        assert!(s.database.migrate);
        assert_eq!(s.cache.ttl(), Some(Duration::from_secs(300)));
        assert_eq!(s.query.max_per_page, 50);
        assert_eq!(s.server.timeout_get, Duration::from_secs(2));
        assert_eq!(s.server.entities_dir, Some(PathBuf::from("./entities")));
    }

    #[test]
    fn malformed_value_names_the_variable() {
        let err = Settings::from_lookup(lookup(&[("DB_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { ref name, .. } if name == "DB_PORT"));
    }
}
