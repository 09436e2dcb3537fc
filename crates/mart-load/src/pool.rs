//! Fixed-size SQLite connection pool.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{LoadError, Result};

/// How long SQLite waits on a locked database before reporting busy.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens one warehouse connection with the pragmas every connection needs.
pub fn open_connection(path: &Path) -> Result<Connection> {
    let open_err = |source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    };
    let conn = Connection::open(path).map_err(open_err)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(open_err)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(open_err)?;
    Ok(conn)
}

/// A bounded set of connections. A caller blocks until one is free.
pub struct ConnectionPool {
    path: PathBuf,
    size: usize,
    idle: Mutex<Vec<Connection>>,
    returned: Condvar,
}

impl ConnectionPool {
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        let size = size.max(1);
        let idle = (0..size)
            .map(|_| open_connection(path))
            .collect::<Result<Vec<_>>>()?;
        debug!(path = %path.display(), size, "opened connection pool");
        Ok(Self {
            path: path.to_path_buf(),
            size,
            idle: Mutex::new(idle),
            returned: Condvar::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Takes a connection, waiting for one to be returned if all are busy.
    pub fn get(&self) -> PooledConnection<'_> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(conn) = idle.pop() {
                return PooledConnection {
                    pool: self,
                    conn: Some(conn),
                };
            }
            idle = self
                .returned
                .wait(idle)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn put(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
        self.returned.notify_one();
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// A connection on loan; goes back to the pool on drop.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `drop` takes the connection out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn connections_enforce_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_connection(&dir.path().join("w.db")).unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn pool_hands_out_at_most_size_connections() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(ConnectionPool::open(&dir.path().join("w.db"), 2).unwrap());
        let first = pool.get();
        let second = pool.get();
        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let conn = pool.get();
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .unwrap()
            })
        };
        drop(first);
        assert_eq!(waiter.join().unwrap(), 1);
        drop(second);
        assert_eq!(pool.idle.lock().unwrap().len(), 2);
    }
}
