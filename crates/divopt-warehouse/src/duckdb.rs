//! `DuckDB` connection pool management.
//!
//! DuckDB permits a single database instance per file within a process, so the
//! pool opens the file once and hands out cloned connections to that instance.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ::duckdb::{AccessMode as DuckAccessMode, Config, Connection};

/// Access mode for the underlying database instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access. Writes fail at the engine level.
    ReadOnly,
    /// Read-write access.
    ReadWrite,
}

struct PoolInner {
    db_path: PathBuf,
    mode: AccessMode,
    max_pool_size: usize,
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
}

/// A connection pool manager for `DuckDB` connections.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Open the database file and create a pool around it.
    ///
    /// # Arguments
    /// * `path` - Path to the `DuckDB` database file
    /// * `max_pool_size` - Maximum number of idle connections kept in the pool
    /// * `mode` - Access mode applied to the database instance
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(
        path: impl Into<PathBuf>,
        max_pool_size: usize,
        mode: AccessMode,
    ) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let root = open_connection(db_path.as_path(), mode)?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path,
                mode,
                max_pool_size: max_pool_size.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Acquire a connection from the pool.
    ///
    /// # Errors
    /// Returns an error if a new connection cannot be cloned from the root
    /// instance.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let idle = lock(&self.inner.idle).pop();
        let connection = match idle {
            Some(connection) => connection,
            None => {
                let connection = lock(&self.inner.root).try_clone()?;
                connection.execute_batch("PRAGMA disable_progress_bar;")?;
                connection
            }
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }

    /// Access mode the database instance was opened with.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.inner.mode
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut idle = lock(&self.pool.idle);
        if idle.len() < self.pool.max_pool_size {
            idle.push(connection);
        }
    }
}

// A poisoned pool only means another thread panicked while pushing or popping
// a connection; the vector itself is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Open the root database connection.
fn open_connection(path: &Path, mode: AccessMode) -> Result<Connection, ::duckdb::Error> {
    let config = match mode {
        AccessMode::ReadOnly => Config::default().access_mode(DuckAccessMode::ReadOnly)?,
        AccessMode::ReadWrite => Config::default().access_mode(DuckAccessMode::ReadWrite)?,
    };
    let connection = Connection::open_with_flags(path, config)?;
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    Ok(connection)
}
