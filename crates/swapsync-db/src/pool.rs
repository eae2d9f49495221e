//! # Database Pool Management
//!
//! Connection pool creation and the [`Database`] handle that hands out
//! repositories.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::from_url("sqlite://swapsync.db")                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← pool + migrations                        │
//! │       │                                                                 │
//! │       ├── .with_notifier(dispatcher_handle)   (engines publish here)    │
//! │       ├── .with_swap_policy(policy)                                     │
//! │       ▼                                                                 │
//! │  db.pos_sales() / db.swaps() / db.repairs() / ...                       │
//! │       each repository clones the pool (an Arc) and the notifier         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! Readers don't block the single writer, so list endpoints stay responsive
//! while an engine transaction holds the write lock.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use swapsync_core::pricing::SwapPolicy;
use swapsync_core::{NoOpSink, NotificationSink};

use crate::error::{DbError, DbResult};
use crate::import::Importer;
use crate::migrations;
use crate::repository::audit::AuditCodeRepository;
use crate::repository::catalog::CatalogRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::notification::NotificationRepository;
use crate::repository::phone::PhoneRepository;
use crate::repository::pos_sale::PosSaleRepository;
use crate::repository::product::ProductRepository;
use crate::repository::repair::RepairRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::sms_config::SmsConfigRepository;
use crate::repository::swap::SwapRepository;
use crate::repository::user::UserRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::from_url("sqlite://swapsync.db")?
///     .max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Builds a configuration from a `sqlite://` or `sqlite:` URL.
    ///
    /// ## Example
    /// ```rust
    /// use swapsync_db::DbConfig;
    ///
    /// let config = DbConfig::from_url("sqlite://data/swapsync.db").unwrap();
    /// assert_eq!(config.database_path.to_str(), Some("data/swapsync.db"));
    /// assert!(DbConfig::from_url("postgresql://localhost/db").is_err());
    /// ```
    pub fn from_url(url: &str) -> DbResult<Self> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .ok_or_else(|| {
                DbError::ConnectionFailed(format!("not a sqlite url: {}", url))
            })?;
        // Drop any query string; connection flags are set below.
        let path = path.split('?').next().unwrap_or(path);
        if path.is_empty() {
            return Err(DbError::ConnectionFailed("empty database path".to_string()));
        }
        if path == ":memory:" {
            return Ok(DbConfig::in_memory());
        }
        Ok(DbConfig::new(path))
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone: the pool and the notifier are reference counted.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Where engines publish customer-facing events after commit.
    notifier: Arc<dyn NotificationSink>,

    /// Economic guard applied by the swap engine.
    swap_policy: SwapPolicy,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys on
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite ships with foreign keys off
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            notifier: Arc::new(NoOpSink),
            swap_policy: SwapPolicy::default(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Replaces the notification sink (the SMS dispatcher in production).
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the swap policy.
    pub fn with_swap_policy(mut self, policy: SwapPolicy) -> Self {
        self.swap_policy = policy;
        self
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the notification sink.
    pub fn notifier(&self) -> Arc<dyn NotificationSink> {
        Arc::clone(&self.notifier)
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    pub fn phones(&self) -> PhoneRepository {
        PhoneRepository::new(self.pool.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Returns the POS engine.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let sale = db.pos_sales().create_pos_sale(&actor, new_sale).await?;
    /// ```
    pub fn pos_sales(&self) -> PosSaleRepository {
        PosSaleRepository::new(self.pool.clone(), self.notifier())
    }

    /// Returns the direct phone sale engine.
    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone(), self.notifier())
    }

    /// Returns the swap engine and resale tracker.
    pub fn swaps(&self) -> SwapRepository {
        SwapRepository::new(self.pool.clone(), self.notifier(), self.swap_policy)
    }

    /// Returns the repair engine.
    pub fn repairs(&self) -> RepairRepository {
        RepairRepository::new(self.pool.clone(), self.notifier())
    }

    pub fn audit_codes(&self) -> AuditCodeRepository {
        AuditCodeRepository::new(self.pool.clone())
    }

    pub fn sms_config(&self) -> SmsConfigRepository {
        SmsConfigRepository::new(self.pool.clone())
    }

    /// In-app notifications and SMS delivery flags.
    pub fn notifications(&self) -> NotificationRepository {
        NotificationRepository::new(self.pool.clone())
    }

    /// CSV bulk import of phones and products.
    pub fn importer(&self) -> Importer {
        Importer::new(self.pool.clone())
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
    }

    #[test]
    fn test_from_url() {
        let config = DbConfig::from_url("sqlite://swapsync.db?mode=rwc").unwrap();
        assert_eq!(config.database_path, PathBuf::from("swapsync.db"));

        let memory = DbConfig::from_url("sqlite::memory:").unwrap();
        assert_eq!(memory.max_connections, 1);

        assert!(DbConfig::from_url("postgresql://db").is_err());
    }
}
