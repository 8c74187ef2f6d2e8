//! Embedded relational store of produced mosaics.
//!
//! One table, keyed by a unique content hash so identical re-runs never
//! produce duplicate rows. The connection is owned by the catalog and
//! access is serialized internally; callers get async methods backed by
//! `spawn_blocking`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors from the catalog layer.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog task failed: {0}")]
    TaskJoin(String),
}

/// One produced artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Surrogate key; 0 until inserted.
    pub mosaic_id: i64,
    pub movie_file_path: String,
    pub mosaic_file_path: String,
    /// Canvas width token, e.g. "5120".
    pub size: String,
    /// Density token, e.g. "M".
    pub density: String,
    /// Parent directories of the source, for grouping.
    pub folder_hierarchy: String,
    /// Hash of the produced bytes; unique across the table.
    pub content_hash: String,
    pub duration: f64,
    pub resolution_width: f64,
    pub resolution_height: f64,
    pub codec: String,
    /// Duration bucket tag.
    pub video_type: String,
    pub creation_date: String,
}

impl CatalogEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(CatalogEntry {
            mosaic_id: row.get(0)?,
            movie_file_path: row.get(1)?,
            mosaic_file_path: row.get(2)?,
            size: row.get(3)?,
            density: row.get(4)?,
            folder_hierarchy: row.get(5)?,
            content_hash: row.get(6)?,
            duration: row.get(7)?,
            resolution_width: row.get(8)?,
            resolution_height: row.get(9)?,
            codec: row.get(10)?,
            video_type: row.get(11)?,
            creation_date: row.get(12)?,
        })
    }
}

const SELECT_COLUMNS: &str = "mosaic_id, movie_file_path, mosaic_file_path, size, density, \
     folder_hierarchy, hash, duration, resolution_width, resolution_height, codec, video_type, \
     creation_date";

/// Hash produced bytes for deduplication.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// The embedded catalog.
#[derive(Clone)]
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    /// Open (creating as needed) a catalog database at `path`.
    pub fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory catalog, used by tests.
    pub fn open_in_memory() -> CatalogResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CatalogResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS mosaics(
                mosaic_id INTEGER PRIMARY KEY AUTOINCREMENT,
                movie_file_path TEXT,
                mosaic_file_path TEXT,
                size TEXT,
                density TEXT,
                folder_hierarchy TEXT,
                hash TEXT UNIQUE,
                duration REAL,
                resolution_width REAL,
                resolution_height REAL,
                codec TEXT,
                video_type TEXT,
                creation_date TEXT);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> CatalogResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("catalog mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|e| CatalogError::TaskJoin(e.to_string()))?
        .map_err(CatalogError::from)
    }

    /// Insert an entry, ignoring duplicates by content hash. Returns
    /// whether a new row was added.
    pub async fn insert(&self, entry: CatalogEntry) -> CatalogResult<bool> {
        let added = self
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO mosaics(
                        movie_file_path, mosaic_file_path, size, density, folder_hierarchy,
                        hash, duration, resolution_width, resolution_height, codec,
                        video_type, creation_date)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        entry.movie_file_path,
                        entry.mosaic_file_path,
                        entry.size,
                        entry.density,
                        entry.folder_hierarchy,
                        entry.content_hash,
                        entry.duration,
                        entry.resolution_width,
                        entry.resolution_height,
                        entry.codec,
                        entry.video_type,
                        entry.creation_date,
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        if !added {
            debug!("duplicate artifact ignored by catalog");
        }
        Ok(added)
    }

    /// Whether a produced artifact with this hash is already recorded.
    pub async fn is_duplicate(&self, hash: &str) -> CatalogResult<bool> {
        let hash = hash.to_string();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT mosaic_id FROM mosaics WHERE hash = ?1",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    /// All entries, newest first.
    pub async fn fetch_all(&self) -> CatalogResult<Vec<CatalogEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM mosaics ORDER BY mosaic_id DESC"
            ))?;
            let rows = stmt.query_map([], CatalogEntry::from_row)?;
            rows.collect()
        })
        .await
    }

    /// All entries for one source file.
    pub async fn fetch_for_file(&self, movie_path: &str) -> CatalogResult<Vec<CatalogEntry>> {
        let movie_path = movie_path.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM mosaics WHERE movie_file_path = ?1 \
                 ORDER BY mosaic_id DESC"
            ))?;
            let rows = stmt.query_map(params![movie_path], CatalogEntry::from_row)?;
            rows.collect()
        })
        .await
    }

    /// Other variants of the same source: rows sharing its
    /// `movie_file_path`, excluding the entry itself.
    pub async fn fetch_variants(&self, entry: &CatalogEntry) -> CatalogResult<Vec<CatalogEntry>> {
        let movie_path = entry.movie_file_path.clone();
        let id = entry.mosaic_id;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM mosaics \
                 WHERE movie_file_path = ?1 AND mosaic_id != ?2 ORDER BY mosaic_id DESC"
            ))?;
            let rows = stmt.query_map(params![movie_path, id], CatalogEntry::from_row)?;
            rows.collect()
        })
        .await
    }

    /// Remove rows whose source no longer exists on disk. Returns the
    /// number of rows removed.
    pub async fn clean(&self) -> CatalogResult<usize> {
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT mosaic_id, movie_file_path FROM mosaics")?;
            let rows: Vec<(i64, String)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?;

            let mut removed = 0usize;
            for (id, path) in rows {
                if !Path::new(&path).exists() {
                    removed += conn
                        .execute("DELETE FROM mosaics WHERE mosaic_id = ?1", params![id])?;
                }
            }
            Ok(removed)
        })
        .await
    }

    /// Row count, handy for idempotence assertions.
    pub async fn count(&self) -> CatalogResult<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM mosaics", [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
        })
        .await
    }
}
