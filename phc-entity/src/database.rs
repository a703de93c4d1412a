//! Shared SQLite handle for the ERP database
//!
//! One connection behind a mutex, opened in WAL mode with a busy timeout.
//! Every request locks it for the duration of its reads or its write
//! transaction, so requests never interleave on the connection.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// Default time a writer waits for the database lock
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite database shared by the entity services
///
/// `Send + Sync` by wrapping the connection in a Mutex.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a write transaction is open
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(busy_timeout)?;

        debug!(path = %path.display(), "opened database");
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Lock the connection.
    ///
    /// A panic while holding the lock leaves no open transaction behind
    /// (rusqlite rolls back on drop), so a poisoned mutex is still usable.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_uses_wal() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("phc.db"), Duration::from_millis(100)).unwrap();
        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let one: i64 = db.conn().query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn test_survives_poisoning() {
        let db = std::sync::Arc::new(Database::open_in_memory().unwrap());
        let clone = db.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.conn();
            panic!("poison");
        })
        .join();
        let one: i64 = db.conn().query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }
}
