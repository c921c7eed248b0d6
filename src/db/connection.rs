// Database connection management
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use super::migrations::run_migrations;
use crate::error::Result;

/// Tables whose changes subscribers can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Tracks,
    Artists,
    Albums,
    Genres,
    Playlists,
    Queue,
    NowPlaying,
}

impl Table {
    const COUNT: usize = 7;

    fn slot(self) -> usize {
        self as usize
    }
}

/// Per-table write counters, published as one value so readers see every change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableVersions([u64; Table::COUNT]);

impl TableVersions {
    /// Counters of just the given tables, for change comparison
    pub fn select(&self, tables: &[Table]) -> Vec<u64> {
        tables.iter().map(|t| self.0[t.slot()]).collect()
    }

    fn bump(&mut self, tables: &[Table]) {
        for table in tables {
            let slot = &mut self.0[table.slot()];
            *slot = slot.wrapping_add(1);
        }
    }
}

pub struct DatabaseConnection {
    conn: Arc<Mutex<Connection>>,
    versions: Arc<watch::Sender<TableVersions>>,
}

impl DatabaseConnection {
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        log::info!("Opened library database at {}", db_path.display());
        Self::from_connection(conn)
    }

    /// Private database, used by tests and throwaway sessions
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        // Run migrations
        run_migrations(&conn)?;

        let (versions, _) = watch::channel(TableVersions::default());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            versions: Arc::new(versions),
        })
    }

    /// Run `f` with exclusive access to the connection on the calling thread
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    /// Run `f` on the blocking pool, then publish a change for `touched`.
    ///
    /// Writes are serialized by the connection lock, in call order per caller.
    pub async fn run<T, F>(&self, touched: &'static [Table], f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        let value = tokio::task::spawn_blocking(move || db.with_conn(f)).await??;
        if !touched.is_empty() {
            self.notify(touched);
        }
        Ok(value)
    }

    /// Read-only variant of [`run`](Self::run)
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        self.run(&[], move |conn| f(conn)).await
    }

    /// Mark tables as changed so live queries re-run
    pub fn notify(&self, tables: &[Table]) {
        log::trace!("Tables changed: {:?}", tables);
        self.versions.send_modify(|v| v.bump(tables));
    }

    pub fn subscribe_changes(&self) -> watch::Receiver<TableVersions> {
        self.versions.subscribe()
    }
}

impl Clone for DatabaseConnection {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            versions: Arc::clone(&self.versions),
        }
    }
}
