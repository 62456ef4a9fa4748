pub mod chat;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod visitors;

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rusqlite::Connection;
use tracing::{debug, info};

/// How long a caller queues for a free connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the store. Cloning is cheap; all clones share one fixed-size
/// pool of connections. Checkout blocks, so call it from blocking contexts
/// (`tokio::task::spawn_blocking`).
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool>,
}

struct Pool {
    idle_tx: Sender<Connection>,
    idle_rx: Receiver<Connection>,
    size: usize,
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a Pool,
}

impl Database {
    /// Open `size` connections to the database at `path`, creating the schema
    /// on the first one before any are handed out.
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        let size = size.max(1);
        let (idle_tx, idle_rx) = crossbeam_channel::bounded(size);

        for i in 0..size {
            let conn = Connection::open(path)?;

            // WAL mode for concurrent reads
            conn.pragma_update(None, "journal_mode", "WAL")?;
            configure(&conn)?;

            if i == 0 {
                migrations::run(&conn)?;
            }
            idle_tx.send(conn).map_err(|_| anyhow!("connection pool closed"))?;
        }

        info!("Database opened at {} ({} connections)", path.display(), size);
        Ok(Self {
            pool: Arc::new(Pool {
                idle_tx,
                idle_rx,
                size,
            }),
        })
    }

    /// Single-connection in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        migrations::run(&conn)?;

        let (idle_tx, idle_rx) = crossbeam_channel::bounded(1);
        idle_tx.send(conn).map_err(|_| anyhow!("connection pool closed"))?;

        Ok(Self {
            pool: Arc::new(Pool {
                idle_tx,
                idle_rx,
                size: 1,
            }),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size
    }

    /// Check out a connection, queueing while the pool is exhausted.
    pub fn acquire(&self) -> Result<PooledConnection<'_>> {
        let conn = match self.pool.idle_rx.try_recv() {
            Ok(conn) => conn,
            Err(_) => {
                debug!("Connection pool exhausted, waiting");
                self.pool.idle_rx.recv_timeout(ACQUIRE_TIMEOUT).map_err(|e| match e {
                    RecvTimeoutError::Timeout => anyhow!(
                        "timed out after {}s waiting for a database connection",
                        ACQUIRE_TIMEOUT.as_secs()
                    ),
                    RecvTimeoutError::Disconnected => anyhow!("connection pool closed"),
                })?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: &self.pool,
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.acquire()?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.acquire()?;
        f(&mut conn)
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection is only taken in drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection is only taken in drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Fails only when every Database handle is gone.
            let _ = self.pool.idle_tx.send(conn);
        }
    }
}

/// True when `err` came from a UNIQUE constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
