use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use super::schema;
use crate::{Error, Result};

/// Shared SQLite connection.
/// Guarded by a parking_lot::Mutex; callers run on blocking threads.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::prepare(&conn)?;

        info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    fn prepare(conn: &Connection) -> Result<()> {
        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| Error::Database(format!("pragmas: {e}")))?;
        conn.execute_batch(schema::CREATE_TABLES)
            .map_err(|e| Error::Database(format!("schema: {e}")))?;

        let version: Option<u32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match version {
            None => {
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [schema::SCHEMA_VERSION],
                )?;
            }
            Some(found) if found > schema::SCHEMA_VERSION => {
                return Err(Error::Database(format!(
                    "schema version {found} is newer than supported version {}",
                    schema::SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a closure with exclusive access, e.g. to open a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
