// Tokenvault - SQLite record backend
//
// Opens (or creates) the on-disk record table. Values arrive already sealed
// by the field cipher, so the file itself never holds plaintext. Each batch
// is one IMMEDIATE transaction: a process crash mid-write leaves either the
// old rows or the new ones. Power-loss durability additionally relies on
// `synchronous = FULL` and the filesystem honouring fsync.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, TransactionBehavior};

use super::backend::RecordBackend;
use super::models::{FieldName, SealedMutation, SealedValue};
use super::StoreError;

/// Wrapper around a SQLite connection holding sealed records.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path`.
    ///
    /// `busy_timeout` bounds how long a call waits on a lock held by another
    /// process before failing with `StoreError::Unavailable`.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "Opened record database");

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing only).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database connection lock poisoned".to_string()))
    }

    /// Run schema migrations to create or update tables.
    fn run_migrations(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                namespace   TEXT NOT NULL,
                field       TEXT NOT NULL,
                nonce       BLOB NOT NULL,
                ciphertext  BLOB NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (namespace, field)
            );
            ",
        )?;

        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }
}

impl RecordBackend for Database {
    fn load(
        &self,
        namespace: &str,
        fields: &[FieldName],
    ) -> Result<Vec<(FieldName, SealedValue)>, StoreError> {
        let conn = self.lock()?;
        // One statement, one snapshot: a concurrent commit is seen entirely or not at all.
        let mut stmt =
            conn.prepare("SELECT field, nonce, ciphertext FROM records WHERE namespace = ?1")?;

        let rows = stmt.query_map(params![namespace], |row| {
            let field: String = row.get(0)?;
            let nonce = blob_bytes(row.get_ref(1)?);
            let ciphertext = blob_bytes(row.get_ref(2)?);
            Ok((field, nonce.zip(ciphertext)))
        })?;

        let mut loaded = Vec::new();
        for row in rows {
            let (name, columns) = row?;
            let Some(field) = FieldName::parse(&name) else {
                tracing::debug!(field = %name, "Ignoring unknown field in record table");
                continue;
            };
            if !fields.contains(&field) {
                continue;
            }
            // Sealed values are always written as blobs; any other type was put there by hand.
            let Some((nonce, ciphertext)) = columns else {
                tracing::warn!(namespace, field = %field, "Stored value has a non-blob type, possible tampering");
                return Err(StoreError::Decryption(field));
            };
            loaded.push((field, SealedValue { nonce, ciphertext }));
        }

        Ok(loaded)
    }

    fn commit(&self, namespace: &str, batch: &[SealedMutation]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        for mutation in batch {
            match mutation {
                SealedMutation::Put(field, sealed) => {
                    tx.execute(
                        "INSERT INTO records (namespace, field, nonce, ciphertext, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(namespace, field) DO UPDATE SET
                             nonce = excluded.nonce,
                             ciphertext = excluded.ciphertext,
                             updated_at = excluded.updated_at",
                        params![namespace, field.as_str(), sealed.nonce, sealed.ciphertext, now],
                    )?;
                }
                SealedMutation::Delete(field) => {
                    tx.execute(
                        "DELETE FROM records WHERE namespace = ?1 AND field = ?2",
                        params![namespace, field.as_str()],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn clear(&self, namespace: &str) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM records WHERE namespace = ?1", params![namespace])?;
        Ok(removed)
    }
}

fn blob_bytes(value: ValueRef<'_>) -> Option<Vec<u8>> {
    match value {
        ValueRef::Blob(bytes) => Some(bytes.to_vec()),
        _ => None,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
