//! SQLite implementation of [`DocumentRepository`]
//!
//! Documents are stored as JSON bodies in a single `documents` table keyed by
//! `(collection, id)`, with indexed columns for the unique and group keys.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::repository::{
    DocumentRepository, DocumentWrite, RawDocument, StorageError, StorageResult,
};

/// SQLite-backed document repository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteDocumentRepository {
    conn: Mutex<Connection>,
}

impl SqliteDocumentRepository {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite document store initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }

    fn create_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS documents (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    unique_key TEXT,
                    group_key TEXT,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (collection, id)
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_unique_key
                    ON documents(collection, unique_key)
                    WHERE unique_key IS NOT NULL;

                CREATE INDEX IF NOT EXISTS idx_documents_group_key
                    ON documents(collection, group_key);

                CREATE TABLE IF NOT EXISTS leases (
                    name TEXT PRIMARY KEY,
                    holder TEXT NOT NULL,
                    expires_at INTEGER NOT NULL
                );
                "#,
        )?;
        Ok(())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn conflict_for(doc: &RawDocument, err: rusqlite::Error) -> StorageError {
    if is_constraint_violation(&err) {
        let key = doc.unique_key.clone().unwrap_or_else(|| doc.id.clone());
        StorageError::conflict(doc.collection, key)
    } else {
        StorageError::Sqlite(err)
    }
}

fn insert_doc(conn: &Connection, doc: &RawDocument) -> StorageResult<()> {
    conn.execute(
        r#"
            INSERT INTO documents (collection, id, unique_key, group_key, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        params![
            doc.collection,
            doc.id,
            doc.unique_key,
            doc.group_key,
            doc.body,
            Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| conflict_for(doc, e))?;
    Ok(())
}

fn update_doc(conn: &Connection, doc: &RawDocument) -> StorageResult<()> {
    let changed = conn
        .execute(
            r#"
                UPDATE documents
                SET unique_key = ?3, group_key = ?4, body = ?5, updated_at = ?6
                WHERE collection = ?1 AND id = ?2
                "#,
            params![
                doc.collection,
                doc.id,
                doc.unique_key,
                doc.group_key,
                doc.body,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| conflict_for(doc, e))?;

    if changed == 0 {
        return Err(StorageError::not_found(doc.collection, &doc.id));
    }
    Ok(())
}

fn delete_doc(conn: &Connection, collection: &str, id: &str) -> StorageResult<bool> {
    let changed = conn.execute(
        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;
    Ok(changed > 0)
}

fn query_bodies(conn: &Connection, sql: &str, args: &[&str]) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |row| {
            row.get::<_, String>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bodies)
}

impl DocumentRepository for SqliteDocumentRepository {
    fn insert(&self, doc: RawDocument) -> StorageResult<()> {
        let conn = self.lock()?;
        insert_doc(&conn, &doc)
    }

    fn update(&self, doc: RawDocument) -> StorageResult<()> {
        let conn = self.lock()?;
        update_doc(&conn, &doc)
    }

    fn get(&self, collection: &'static str, id: &str) -> StorageResult<Option<String>> {
        let conn = self.lock()?;
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn find_unique(&self, collection: &'static str, key: &str) -> StorageResult<Option<String>> {
        let conn = self.lock()?;
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND unique_key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn find_group(&self, collection: &'static str, key: &str) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        query_bodies(
            &conn,
            "SELECT body FROM documents WHERE collection = ?1 AND group_key = ?2 ORDER BY seq",
            &[collection, key],
        )
    }

    fn list(&self, collection: &'static str) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        query_bodies(
            &conn,
            "SELECT body FROM documents WHERE collection = ?1 ORDER BY seq",
            &[collection],
        )
    }

    fn delete(&self, collection: &'static str, id: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        delete_doc(&conn, collection, id)
    }

    fn apply(&self, writes: Vec<DocumentWrite>) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for write in &writes {
            match write {
                DocumentWrite::Update(doc) => update_doc(&tx, doc)?,
                DocumentWrite::Delete { collection, id } => {
                    delete_doc(&tx, collection, id)?;
                }
            }
        }

        // Dropping `tx` on an early return rolls everything back
        tx.commit()?;
        Ok(())
    }

    fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            r#"
                INSERT INTO leases (name, holder, expires_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(name) DO UPDATE SET
                    holder = excluded.holder,
                    expires_at = excluded.expires_at
                WHERE leases.expires_at <= ?4 OR leases.holder = excluded.holder
                "#,
            params![
                name,
                holder,
                expires_at.timestamp_millis(),
                now.timestamp_millis()
            ],
        )?;
        Ok(changed > 0)
    }

    fn release_lease(&self, name: &str, holder: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM leases WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn raw(id: &str, unique: Option<&str>) -> RawDocument {
        RawDocument {
            collection: "things",
            id: id.to_string(),
            unique_key: unique.map(String::from),
            group_key: None,
            body: format!(r#"{{"id":"{id}"}}"#),
        }
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("edutrack.db");

        {
            let repo = SqliteDocumentRepository::new(&path).unwrap();
            repo.insert(raw("1", Some("k1"))).unwrap();
        }

        let reopened = SqliteDocumentRepository::new(&path).unwrap();
        assert!(reopened.get("things", "1").unwrap().is_some());
        assert!(reopened.find_unique("things", "k1").unwrap().is_some());
    }

    #[test]
    fn test_update_conflicting_unique_key() {
        let repo = SqliteDocumentRepository::in_memory().unwrap();
        repo.insert(raw("1", Some("a"))).unwrap();
        repo.insert(raw("2", Some("b"))).unwrap();

        let err = repo.update(raw("2", Some("a"))).unwrap_err();
        assert!(err.is_conflict());
    }
}
