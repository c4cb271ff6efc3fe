//! Connection pool and configuration.

use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BackendError, StorageError, StorageResult};

pub(crate) const BACKEND_NAME: &str = "sqlite";

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStorageConfig {
    /// Database file path; `None` opens a private in-memory database.
    #[serde(default)]
    pub path: Option<String>,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency (file databases only).
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Create the table on startup if it does not exist.
    #[serde(default = "default_true")]
    pub create_table: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqlStorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            create_table: true,
        }
    }
}

impl SqlStorageConfig {
    /// Configuration for a file database at `path`.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Returns whether this configures an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.path.as_deref().is_none_or(|p| p == ":memory:")
    }
}

/// Builds the connection pool.
///
/// An in-memory database lives only as long as its connection, so it gets a
/// single connection that is never reaped.
pub(crate) fn open_pool(config: &SqlStorageConfig) -> StorageResult<Pool<SqliteConnectionManager>> {
    let is_memory = config.is_memory();
    let manager = match &config.path {
        Some(path) if !is_memory => SqliteConnectionManager::file(path),
        _ => SqliteConnectionManager::memory(),
    };

    let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
    let enable_wal = config.enable_wal && !is_memory;
    let manager = manager.with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA case_sensitive_like = ON;")?;
        if enable_wal {
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        }
        Ok(())
    });

    let builder = Pool::builder().connection_timeout(Duration::from_millis(
        config.connection_timeout_ms,
    ));
    let builder = if is_memory {
        builder
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        builder
            .max_size(config.max_connections.max(1))
            .min_idle(Some(config.min_connections.min(config.max_connections)))
    };

    let pool = builder.build(manager).map_err(|e| {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: e.to_string(),
        })
    })?;
    debug!(
        path = config.path.as_deref().unwrap_or(":memory:"),
        max_connections = pool.max_size(),
        "opened sqlite pool"
    );
    Ok(pool)
}

/// Gets a connection from the pool.
pub(crate) fn get_connection(
    pool: &Pool<SqliteConnectionManager>,
) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
    pool.get().map_err(|e| {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_json() {
        let config: SqlStorageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SqlStorageConfig::default());
        assert!(config.is_memory());

        let config: SqlStorageConfig =
            serde_json::from_str(r#"{"path": "books.db", "max_connections": 4}"#).unwrap();
        assert!(!config.is_memory());
        assert_eq!(config.max_connections, 4);
        assert!(config.create_table);
    }

    #[test]
    fn test_memory_pool_uses_case_sensitive_like() {
        let pool = open_pool(&SqlStorageConfig::default()).unwrap();
        let conn = get_connection(&pool).unwrap();
        let matched: bool = conn
            .query_row("SELECT 'Dune' LIKE 'dune'", [], |row| row.get(0))
            .unwrap();
        assert!(!matched);
    }
}
