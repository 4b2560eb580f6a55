//! Database repository layer
//!
//! Stores opaque JSON records under fixed keys. The process store decides
//! what the keys are and what goes in them.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A record as stored on disk
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection()?;
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Config("database connection lock poisoned".to_string()))
    }

    // ============================================
    // Record operations
    // ============================================

    /// Insert or replace a record in one statement
    pub fn put_record(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO records (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Get a record by key
    pub fn get_record(&self, key: &str) -> Result<Option<StoredRecord>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT key, value, updated_at FROM records WHERE key = ?",
            [key],
            |row| {
                let updated_at_str: String = row.get("updated_at")?;
                Ok(StoredRecord {
                    key: row.get("key")?,
                    value: row.get("value")?,
                    updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Delete a record. Returns true if a record was removed.
    pub fn delete_record(&self, key: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn.execute("DELETE FROM records WHERE key = ?", [key])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_record_crud() {
        let db = test_db();

        assert!(db.get_record("k").unwrap().is_none());

        db.put_record("k", r#"{"a":1}"#).unwrap();
        let record = db.get_record("k").unwrap().unwrap();
        assert_eq!(record.key, "k");
        assert_eq!(record.value, r#"{"a":1}"#);

        db.put_record("k", r#"{"a":2}"#).unwrap();
        assert_eq!(db.get_record("k").unwrap().unwrap().value, r#"{"a":2}"#);

        assert!(db.delete_record("k").unwrap());
        assert!(!db.delete_record("k").unwrap());
        assert!(db.get_record("k").unwrap().is_none());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/data.db");
        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        assert!(path.exists());
    }
}
