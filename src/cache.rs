//! SQLite-backed cache of repository records.

use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8Path;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tokio::sync::watch;
use tracing::debug;

use crate::domain::{RepositoryRecord, lists_identical};
use crate::error::ViewerError;

const SELECT_COLUMNS: &str = "SELECT id, owner_login, owner_avatar_url, project_name, project_url, \
     project_description, project_stars_count, local_path FROM repositories";

/// One row per repository id.
///
/// Inserts never overwrite: a second insert for a known id fails with
/// [`ViewerError::AlreadyCached`] so an existing `local_path` survives.
/// Writes are serialized by the connection mutex.
#[derive(Clone)]
pub struct RepositoryCache {
    conn: Arc<Mutex<Connection>>,
    loaded_tx: Arc<watch::Sender<Vec<RepositoryRecord>>>,
}

impl RepositoryCache {
    pub fn open(db_path: &Utf8Path) -> Result<Self, ViewerError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent.as_std_path()).map_err(|err| {
                ViewerError::Filesystem(format!("create cache directory {parent}: {err}"))
            })?;
        }
        let conn = Connection::open(db_path.as_std_path())
            .map_err(|err| ViewerError::Database(format!("open {db_path}: {err}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_error)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, ViewerError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, ViewerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY NOT NULL,
                owner_login TEXT NOT NULL,
                owner_avatar_url TEXT NOT NULL,
                project_name TEXT NOT NULL,
                project_url TEXT NOT NULL,
                project_description TEXT NOT NULL,
                project_stars_count INTEGER NOT NULL,
                local_path TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_repositories_owner
                ON repositories(owner_login);
            "#,
        )
        .map_err(db_error)?;

        let loaded = query_loaded(&conn)?;
        let (loaded_tx, _) = watch::channel(loaded);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            loaded_tx: Arc::new(loaded_tx),
        })
    }

    pub fn insert(&self, record: &RepositoryRecord) -> Result<(), ViewerError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO repositories (id, owner_login, owner_avatar_url, project_name, \
             project_url, project_description, project_stars_count, local_path) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.owner_login,
                record.owner_avatar_url,
                record.project_name,
                record.project_url,
                record.project_description,
                record.project_stars_count,
                record.local_path,
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(ViewerError::AlreadyCached(record.id));
            }
            Err(err) => return Err(db_error(err)),
        }
        self.publish_loaded(&conn)
    }

    pub fn update(&self, record: &RepositoryRecord) -> Result<(), ViewerError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE repositories SET owner_login = ?2, owner_avatar_url = ?3, \
                 project_name = ?4, project_url = ?5, project_description = ?6, \
                 project_stars_count = ?7, local_path = ?8 WHERE id = ?1",
                params![
                    record.id,
                    record.owner_login,
                    record.owner_avatar_url,
                    record.project_name,
                    record.project_url,
                    record.project_description,
                    record.project_stars_count,
                    record.local_path,
                ],
            )
            .map_err(db_error)?;
        if changed == 0 {
            return Err(ViewerError::RecordNotFound(record.id.to_string()));
        }
        self.publish_loaded(&conn)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<RepositoryRecord>, ViewerError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id],
            record_from_row,
        )
        .optional()
        .map_err(db_error)
    }

    pub fn get_by_owner(&self, owner_login: &str) -> Result<Vec<RepositoryRecord>, ViewerError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE owner_login = ?1 ORDER BY rowid"
            ))
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![owner_login], record_from_row)
            .map_err(db_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
    }

    /// Records with a local path, i.e. believed to be downloaded.
    pub fn loaded(&self) -> Result<Vec<RepositoryRecord>, ViewerError> {
        let conn = self.lock()?;
        query_loaded(&conn)
    }

    /// Live view of [`RepositoryCache::loaded`]. A new value is published
    /// only when it differs from the previous one.
    pub fn subscribe_loaded(&self) -> watch::Receiver<Vec<RepositoryRecord>> {
        self.loaded_tx.subscribe()
    }

    fn publish_loaded(&self, conn: &Connection) -> Result<(), ViewerError> {
        let loaded = query_loaded(conn)?;
        let published = self.loaded_tx.send_if_modified(|current| {
            if lists_identical(current, &loaded) {
                false
            } else {
                *current = loaded;
                true
            }
        });
        if published {
            debug!("downloaded records changed");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ViewerError> {
        self.conn
            .lock()
            .map_err(|err| ViewerError::Database(format!("failed to lock database: {err}")))
    }
}

fn query_loaded(conn: &Connection) -> Result<Vec<RepositoryRecord>, ViewerError> {
    let mut stmt = conn
        .prepare(&format!(
            "{SELECT_COLUMNS} WHERE local_path IS NOT NULL ORDER BY rowid"
        ))
        .map_err(db_error)?;
    let rows = stmt.query_map([], record_from_row).map_err(db_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RepositoryRecord> {
    Ok(RepositoryRecord {
        id: row.get(0)?,
        owner_login: row.get(1)?,
        owner_avatar_url: row.get(2)?,
        project_name: row.get(3)?,
        project_url: row.get(4)?,
        project_description: row.get(5)?,
        project_stars_count: row.get(6)?,
        local_path: row.get(7)?,
    })
}

fn db_error(err: rusqlite::Error) -> ViewerError {
    ViewerError::Database(err.to_string())
}
