//! Daemon configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;
use std::time::Duration;

use swapsync_notify::NotifyConfig;

/// Daemon configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// SQLite connection string
    pub database_url: String,

    /// Pool size
    pub db_max_connections: u32,

    /// Fernet key for stored SMS credentials (optional)
    pub sms_encryption_key: Option<String>,

    /// tracing EnvFilter directive
    pub log_level: String,

    /// Hosted deployment (Railway or Vercel)
    pub production: bool,

    /// Browser origins allowed by the API front end
    pub allowed_origins: Vec<String>,

    /// Minimum swap coverage, percent of the new phone's value
    pub swap_value_floor_percent: u32,

    /// Super admin created on first start, when username and password are set
    pub bootstrap_admin: Option<BootstrapAdmin>,

    /// SMS dispatcher and scheduler tuning
    pub notify: NotifyConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("db_max_connections", &self.db_max_connections)
            .field("sms_encryption_key", &self.sms_encryption_key.as_ref().map(|_| "********"))
            .field("log_level", &self.log_level)
            .field("production", &self.production)
            .field("allowed_origins", &self.allowed_origins)
            .field("swap_value_floor_percent", &self.swap_value_floor_percent)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .field("notify", &self.notify)
            .finish()
    }
}

/// First super admin account.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    pub full_name: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = normalize_database_url(
            &var("DATABASE_URL").unwrap_or_else(|| "sqlite://swapsync.db".to_string()),
        );
        if database_url.starts_with("postgresql://") {
            return Err(ConfigError::UnsupportedDatabase(database_url));
        }

        let production = var("RAILWAY_ENVIRONMENT").is_some() || var("VERCEL").is_some();

        let allowed_origins: Vec<String> = var("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        if production && allowed_origins.iter().any(|origin| origin == "*") {
            return Err(ConfigError::WildcardOrigin);
        }

        let bootstrap_admin = match (
            var("SUPER_ADMIN_USERNAME"),
            var("SUPER_ADMIN_PASSWORD"),
            var("SUPER_ADMIN_NAME"),
        ) {
            (Some(username), Some(password), full_name) => Some(BootstrapAdmin {
                username,
                password,
                full_name: full_name.unwrap_or_else(|| "System Administrator".to_string()),
            }),
            (Some(_), None, _) => return Err(ConfigError::MissingRequired("SUPER_ADMIN_PASSWORD".to_string())),
            _ => None,
        };

        let config = AppConfig {
            database_url,

            db_max_connections: parse(&var, "DB_MAX_CONNECTIONS", 5)?,

            sms_encryption_key: var("SMS_ENCRYPTION_KEY").filter(|key| !key.trim().is_empty()),

            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            production,

            allowed_origins,

            swap_value_floor_percent: parse(&var, "SWAP_VALUE_FLOOR_PERCENT", 50)?,

            bootstrap_admin,

            notify: NotifyConfig {
                workers: parse(&var, "SMS_WORKERS", 4)?,
                queue_capacity: parse(&var, "SMS_QUEUE_CAPACITY", 1024)?,
                provider_timeout: Duration::from_secs(parse(&var, "SMS_TIMEOUT_SECS", 10)?),
                scheduler_tick: Duration::from_secs(parse(&var, "SCHEDULER_TICK_SECS", 60)?),
                broadcast_hour: parse(&var, "BROADCAST_HOUR", 8)?,
            },
        };

        if config.swap_value_floor_percent > 100 {
            return Err(ConfigError::InvalidValue("SWAP_VALUE_FLOOR_PERCENT".to_string()));
        }
        if config.notify.broadcast_hour > 23 {
            return Err(ConfigError::InvalidValue("BROADCAST_HOUR".to_string()));
        }
        if config.notify.scheduler_tick.is_zero() {
            return Err(ConfigError::InvalidValue("SCHEDULER_TICK_SECS".to_string()));
        }

        Ok(config)
    }
}

fn parse<F, T>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Hosting platforms hand out `postgres://`; sqlx and most tools want
/// `postgresql://`.
fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{}", rest),
        None => url.to_string(),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Unsupported database URL {0}: this build opens SQLite only")]
    UnsupportedDatabase(String),

    #[error("ALLOWED_ORIGINS may not contain * in production")]
    WildcardOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://swapsync.db");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.swap_value_floor_percent, 50);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.notify.workers, 4);
        assert!(!config.production);
        assert!(config.sms_encryption_key.is_none());
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_postgres_rejected_after_coercion() {
        let err = load(&[("DATABASE_URL", "postgres://u:p@host/db")]).unwrap_err();
        match err {
            ConfigError::UnsupportedDatabase(url) => assert!(url.starts_with("postgresql://")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_origin_only_rejected_in_production() {
        assert!(load(&[("ALLOWED_ORIGINS", "*")]).is_ok());
        assert!(matches!(
            load(&[("ALLOWED_ORIGINS", "https://shop.example, *"), ("VERCEL", "1")]),
            Err(ConfigError::WildcardOrigin)
        ));
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            load(&[("SMS_WORKERS", "many")]),
            Err(ConfigError::InvalidValue(key)) if key == "SMS_WORKERS"
        ));
        assert!(load(&[("SWAP_VALUE_FLOOR_PERCENT", "150")]).is_err());
    }

    #[test]
    fn test_bootstrap_admin() {
        let config = load(&[("SUPER_ADMIN_USERNAME", "root"), ("SUPER_ADMIN_PASSWORD", "s3cret-pass")]).unwrap();
        let admin = config.bootstrap_admin.unwrap();
        assert_eq!(admin.username, "root");
        assert!(!format!("{admin:?}").contains("s3cret"));

        assert!(matches!(
            load(&[("SUPER_ADMIN_USERNAME", "root")]),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
