//! Private Files Vault - Catalog
//!
//! Persistent list of at-rest containers. Every read and write goes through
//! one mutex: the catalog is the single serialization point of the vault.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::item::Privacy;
use crate::kind::FileKind;

/// One registered container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    /// At-rest container path
    pub path: String,
    pub kind: FileKind,
    pub privacy: Privacy,
    pub is_favorite: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Catalog of encrypted entries
pub trait Catalog: Send + Sync {
    /// Register a container (re-registering a path updates kind and privacy)
    fn add(&self, path: &Path, kind: FileKind, privacy: Privacy) -> VaultResult<CatalogEntry>;

    /// Returns whether an entry was removed
    fn remove(&self, path: &Path) -> VaultResult<bool>;

    fn find_by_path(&self, path: &Path) -> VaultResult<Option<CatalogEntry>>;

    /// Oldest first
    fn list_all(&self) -> VaultResult<Vec<CatalogEntry>>;

    /// Point an entry at a relocated container
    fn update_path(&self, old: &Path, new: &Path) -> VaultResult<bool>;

    fn set_privacy(&self, path: &Path, privacy: Privacy) -> VaultResult<bool>;
}

/// SQLite-backed catalog
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog database at `db_path`
    pub fn open(db_path: &Path) -> VaultResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    /// Throwaway catalog
    pub fn open_in_memory() -> VaultResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> VaultResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                privacy INTEGER NOT NULL DEFAULT 0,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                note TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_created ON files(created_at);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Count entries
    pub fn count(&self) -> VaultResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn find_locked(conn: &Connection, path: &str) -> VaultResult<Option<CatalogEntry>> {
        let raw = conn
            .query_row(
                "SELECT id, path, kind, privacy, is_favorite, note, created_at
                 FROM files WHERE path = ?1",
                params![path],
                RawEntry::from_row,
            )
            .optional()?;

        raw.map(RawEntry::into_entry).transpose()
    }
}

impl Catalog for SqliteCatalog {
    fn add(&self, path: &Path, kind: FileKind, privacy: Privacy) -> VaultResult<CatalogEntry> {
        let path = path_key(path);
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO files (path, kind, privacy, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET kind = excluded.kind, privacy = excluded.privacy",
            params![path, kind.as_str(), privacy.code(), Utc::now().to_rfc3339()],
        )?;

        Self::find_locked(&conn, &path)?
            .ok_or_else(|| VaultError::DatabaseError(format!("entry {} vanished", path)))
    }

    fn remove(&self, path: &Path) -> VaultResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM files WHERE path = ?1", params![path_key(path)])?;
        Ok(changed > 0)
    }

    fn find_by_path(&self, path: &Path) -> VaultResult<Option<CatalogEntry>> {
        let conn = self.conn.lock();
        Self::find_locked(&conn, &path_key(path))
    }

    fn list_all(&self) -> VaultResult<Vec<CatalogEntry>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, path, kind, privacy, is_favorite, note, created_at
             FROM files ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], RawEntry::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    fn update_path(&self, old: &Path, new: &Path) -> VaultResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE files SET path = ?2 WHERE path = ?1",
            params![path_key(old), path_key(new)],
        )?;
        Ok(changed > 0)
    }

    fn set_privacy(&self, path: &Path, privacy: Privacy) -> VaultResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE files SET privacy = ?2 WHERE path = ?1",
            params![path_key(path), privacy.code()],
        )?;
        Ok(changed > 0)
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Row as stored, before validation
struct RawEntry {
    id: i64,
    path: String,
    kind: String,
    privacy: i64,
    is_favorite: bool,
    note: Option<String>,
    created_at: String,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            path: row.get(1)?,
            kind: row.get(2)?,
            privacy: row.get(3)?,
            is_favorite: row.get(4)?,
            note: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_entry(self) -> VaultResult<CatalogEntry> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| VaultError::DeserializationError(format!("created_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(CatalogEntry {
            id: self.id,
            path: self.path,
            kind: FileKind::parse(&self.kind),
            privacy: Privacy::from_code(self.privacy),
            is_favorite: self.is_favorite,
            note: self.note,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_add_find_remove() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let path = PathBuf::from("/vault/Encrypted/0b6e");

        let entry = catalog.add(&path, FileKind::Image, Privacy::None).unwrap();
        assert_eq!(entry.kind, FileKind::Image);
        assert_eq!(entry.path, "/vault/Encrypted/0b6e");
        assert!(!entry.is_favorite);

        let found = catalog.find_by_path(&path).unwrap().unwrap();
        assert_eq!(found, entry);

        assert!(catalog.remove(&path).unwrap());
        assert!(!catalog.remove(&path).unwrap());
        assert!(catalog.find_by_path(&path).unwrap().is_none());
    }

    #[test]
    fn test_readd_updates_in_place() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let path = PathBuf::from("/e/1");

        let first = catalog.add(&path, FileKind::Unknown, Privacy::None).unwrap();
        let second = catalog.add(&path, FileKind::Video, Privacy::Blurred).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.kind, FileKind::Video);
        assert_eq!(second.privacy, Privacy::Blurred);
        assert_eq!(catalog.count().unwrap(), 1);
    }

    #[test]
    fn test_update_path_and_privacy() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let old = PathBuf::from("/old/Encrypted/a");
        let new = PathBuf::from("/new/Encrypted/a");
        catalog.add(&old, FileKind::Document, Privacy::None).unwrap();

        assert!(catalog.update_path(&old, &new).unwrap());
        assert!(catalog.find_by_path(&old).unwrap().is_none());

        assert!(catalog.set_privacy(&new, Privacy::Blurred).unwrap());
        let entry = catalog.find_by_path(&new).unwrap().unwrap();
        assert_eq!(entry.privacy, Privacy::Blurred);

        assert!(!catalog.set_privacy(&old, Privacy::None).unwrap());
    }

    #[test]
    fn test_persists_across_open() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("db/catalog.db");

        {
            let catalog = SqliteCatalog::open(&db).unwrap();
            catalog.add(Path::new("/e/1"), FileKind::Audio, Privacy::None).unwrap();
            catalog.add(Path::new("/e/2"), FileKind::Directory, Privacy::None).unwrap();
        }

        let catalog = SqliteCatalog::open(&db).unwrap();
        let all = catalog.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].path, "/e/1");
        assert_eq!(all[1].kind, FileKind::Directory);
    }

    #[test]
    fn test_concurrent_adds() {
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());

        std::thread::scope(|s| {
            for t in 0..4 {
                let catalog = Arc::clone(&catalog);
                s.spawn(move || {
                    for i in 0..25 {
                        let path = PathBuf::from(format!("/e/{}-{}", t, i));
                        catalog.add(&path, FileKind::Image, Privacy::None).unwrap();
                    }
                });
            }
        });

        assert_eq!(catalog.count().unwrap(), 100);
    }
}
