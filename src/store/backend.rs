// Tokenvault - Record backends
//
// A backend persists opaque sealed values and nothing else; it never sees a
// key or a plaintext. The one promise it must keep is that `commit` applies
// a whole batch or none of it.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::models::{FieldName, SealedMutation, SealedValue};
use super::StoreError;

/// Raw byte persistence for sealed records, scoped by namespace.
pub trait RecordBackend: Send + Sync {
    /// Load the requested fields in a single consistent read.
    /// Fields that were never written are simply missing from the result.
    fn load(
        &self,
        namespace: &str,
        fields: &[FieldName],
    ) -> Result<Vec<(FieldName, SealedValue)>, StoreError>;

    /// Apply every mutation in one transaction.
    fn commit(&self, namespace: &str, batch: &[SealedMutation]) -> Result<(), StoreError>;

    /// Delete every record in the namespace in one transaction. Returns rows removed.
    fn clear(&self, namespace: &str) -> Result<usize, StoreError>;
}

// ─── In-Memory Implementation ────────────────────────────────────────────────

/// Non-durable backend. Records vanish with the process.
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<(String, FieldName), SealedValue>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<(String, FieldName), SealedValue>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<(String, FieldName), SealedValue>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".to_string()))
    }
}

impl RecordBackend for MemoryBackend {
    fn load(
        &self,
        namespace: &str,
        fields: &[FieldName],
    ) -> Result<Vec<(FieldName, SealedValue)>, StoreError> {
        let records = self.read()?;
        Ok(fields
            .iter()
            .filter_map(|field| {
                records
                    .get(&(namespace.to_string(), *field))
                    .map(|sealed| (*field, sealed.clone()))
            })
            .collect())
    }

    fn commit(&self, namespace: &str, batch: &[SealedMutation]) -> Result<(), StoreError> {
        let mut records = self.write()?;
        for mutation in batch {
            match mutation {
                SealedMutation::Put(field, sealed) => {
                    records.insert((namespace.to_string(), *field), sealed.clone());
                }
                SealedMutation::Delete(field) => {
                    records.remove(&(namespace.to_string(), *field));
                }
            }
        }
        Ok(())
    }

    fn clear(&self, namespace: &str) -> Result<usize, StoreError> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|(ns, _), _| ns != namespace);
        Ok(before - records.len())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
