use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use rusqlite::Connection;
use std::time::Duration;

/// Apply performance PRAGMAs to a SQLite connection.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA page_size = 8192;
        PRAGMA cache_size = -65536;
        PRAGMA mmap_size = 268435456;
        PRAGMA busy_timeout = 5000;
        PRAGMA temp_store = MEMORY;
        PRAGMA wal_autocheckpoint = 1000;
        ",
    )
}

/// Create a deadpool-sqlite connection pool with restrictive file permissions.
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool, deadpool_sqlite::CreatePoolError> {
    let db_path = config.path.clone();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create database directory");
            }
        }
    }

    // Set restrictive file permissions on the database file (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if db_path.exists() {
            if let Err(e) =
                std::fs::set_permissions(&db_path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(error = %e, "failed to set database file permissions");
            }
        }
    }

    let mut cfg = Config::new(db_path);
    cfg.pool = Some(PoolConfig::new(config.pool_size));
    cfg.create_pool(Runtime::Tokio1)
}

/// Handle to the shared connection pool, constructed once at startup and
/// passed explicitly to everything that touches storage.
#[derive(Clone)]
pub struct Db {
    pool: Pool,
    command_timeout: Duration,
}

impl Db {
    /// Establish the pool, apply PRAGMAs, and run migrations. Blocks until
    /// the schema is in place; schema failure is fatal to the caller.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = create_pool(config)
            .map_err(|e| AppError::Connection(format!("failed to create pool: {e}")))?;

        let db = Self {
            pool,
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        };

        let conn = db
            .pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("failed to acquire connection: {e}")))?;
        conn.interact(|conn| {
            apply_pragmas(conn)?;
            crate::storage::migrations::run_migrations(conn)?;
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| AppError::Connection(format!("interact error: {e}")))?
        .map_err(|e| AppError::Schema(format!("migrations failed: {e}")))?;

        Ok(db)
    }

    /// Wrap an existing pool (tests build their own via `create_pool`).
    pub fn from_pool(pool: Pool, command_timeout: Duration) -> Self {
        Self {
            pool,
            command_timeout,
        }
    }

    /// Close the pool. Safe to call even after a partial initialization;
    /// in-flight operations fail instead of hanging.
    pub fn close(&self) {
        self.pool.close();
    }

    /// Run one storage operation on a pooled connection. Acquisition and
    /// execution are each bounded by the command timeout; the operation name
    /// is attached to every failure for logging context.
    pub async fn run<F, T>(&self, op: &'static str, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = tokio::time::timeout(self.command_timeout, self.pool.get())
            .await
            .map_err(|_| AppError::Timeout(format!("{op}: connection acquire timed out")))?
            .map_err(|e| AppError::Connection(format!("{op}: pool error: {e}")))?;

        let result = tokio::time::timeout(
            self.command_timeout,
            conn.interact(move |conn| {
                // busy_timeout is per-connection; writers on sibling pool
                // connections must wait for the lock, not fail
                conn.busy_timeout(Duration::from_millis(5000))?;
                f(conn)
            }),
        )
        .await
        .map_err(|_| AppError::Timeout(format!("{op}: exceeded command timeout")))?
        .map_err(|e| AppError::Internal(format!("{op}: interact error: {e}")))??;

        Ok(result)
    }
}
