// Tokenvault - Encrypted Record Store
//
// Implements field-level get / atomic set / remove / clear on top of any
// `RecordBackend`. Plaintext never reaches the backend: every value is sealed
// by the field cipher before commit and authenticated on read. A value that
// fails authentication is an error, never "absent".

use std::sync::Mutex;

use crate::enclave::KeyHandle;

use super::backend::RecordBackend;
use super::cipher::FieldCipher;
use super::models::{CredentialRecord, FieldName, Mutation, SealedMutation, SecretValue};
use super::StoreError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over encrypted field storage.
pub trait RecordStore: Send + Sync {
    /// Decrypt one field. `Ok(None)` means it was never written (or was removed).
    fn get(&self, field: FieldName) -> Result<Option<SecretValue>, StoreError>;

    /// Decrypt several fields from one consistent read.
    fn snapshot(&self, fields: &[FieldName]) -> Result<CredentialRecord, StoreError>;

    /// Apply a mixed put/delete batch as a single transaction.
    fn apply(&self, batch: &[Mutation]) -> Result<(), StoreError>;

    /// Delete every record in this store's namespace.
    fn clear_all(&self) -> Result<(), StoreError>;

    /// Write one or more fields so they become visible together.
    fn set_atomic(&self, fields: Vec<(FieldName, SecretValue)>) -> Result<(), StoreError> {
        let batch: Vec<Mutation> = fields
            .into_iter()
            .map(|(field, value)| Mutation::Put(field, value))
            .collect();
        self.apply(&batch)
    }

    /// Delete the listed fields together. Absent fields are ignored.
    fn remove(&self, fields: &[FieldName]) -> Result<(), StoreError> {
        let batch: Vec<Mutation> = fields.iter().map(|f| Mutation::Delete(*f)).collect();
        self.apply(&batch)
    }
}

// ─── Implementation ──────────────────────────────────────────────────────────

pub struct EncryptedRecordStore<B> {
    backend: B,
    cipher: FieldCipher,
    // Single-writer discipline across all mutating calls.
    write_lock: Mutex<()>,
}

impl<B: RecordBackend> EncryptedRecordStore<B> {
    pub fn new(backend: B, key: &KeyHandle, namespace: &str) -> Self {
        Self {
            backend,
            cipher: FieldCipher::new(key, namespace),
            write_lock: Mutex::new(()),
        }
    }

    pub fn namespace(&self) -> &str {
        self.cipher.namespace()
    }

    fn exclusive<T>(&self, op: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("writer lock poisoned".to_string()))?;
        op()
    }
}

impl<B: RecordBackend> RecordStore for EncryptedRecordStore<B> {
    fn get(&self, field: FieldName) -> Result<Option<SecretValue>, StoreError> {
        let mut record = self.snapshot(&[field])?;
        Ok(record.remove(field))
    }

    fn snapshot(&self, fields: &[FieldName]) -> Result<CredentialRecord, StoreError> {
        let sealed = self.backend.load(self.namespace(), fields)?;

        let mut record = CredentialRecord::new();
        for (field, value) in sealed {
            let plain = self.cipher.open(field, &value).inspect_err(|e| {
                tracing::warn!(
                    namespace = %self.namespace(),
                    field = %field,
                    error = %e,
                    "Stored value failed to decrypt, possible tampering"
                );
            })?;
            record.insert(field, plain);
        }

        Ok(record)
    }

    fn apply(&self, batch: &[Mutation]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        // Seal everything up front so an encryption failure commits nothing.
        let sealed = batch
            .iter()
            .map(|mutation| match mutation {
                Mutation::Put(field, value) => self
                    .cipher
                    .seal(*field, value)
                    .map(|s| SealedMutation::Put(*field, s)),
                Mutation::Delete(field) => Ok(SealedMutation::Delete(*field)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.exclusive(|| self.backend.commit(self.namespace(), &sealed))?;

        tracing::debug!(
            namespace = %self.namespace(),
            fields = ?batch.iter().map(Mutation::field).collect::<Vec<_>>(),
            "Committed record batch"
        );

        Ok(())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let removed = self.exclusive(|| self.backend.clear(self.namespace()))?;
        tracing::debug!(namespace = %self.namespace(), removed, "Cleared all records");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::{KeyBacking, KEY_LEN};
    use crate::store::backend::MemoryBackend;
    use crate::store::db::Database;
    use crate::store::models::SealedValue;

    fn key() -> KeyHandle {
        KeyHandle::from_bytes(&[5u8; KEY_LEN], KeyBacking::Software).unwrap()
    }

    fn memory_store() -> EncryptedRecordStore<MemoryBackend> {
        EncryptedRecordStore::new(MemoryBackend::new(), &key(), "test.ns")
    }

    fn sqlite_store() -> EncryptedRecordStore<Database> {
        EncryptedRecordStore::new(Database::open_in_memory().unwrap(), &key(), "test.ns")
    }

    fn tamper(backend: &impl RecordBackend, field: FieldName) {
        let (_, mut sealed) = backend
            .load("test.ns", &[field])
            .unwrap()
            .pop()
            .expect("field should be stored");
        sealed.ciphertext[0] ^= 0xFF;
        backend
            .commit("test.ns", &[SealedMutation::Put(field, sealed)])
            .unwrap();
    }

    #[test]
    fn test_get_absent_field_returns_none() {
        let store = memory_store();
        assert!(store.get(FieldName::AccessToken).unwrap().is_none());
    }

    #[test]
    fn test_set_atomic_then_get() {
        let store = sqlite_store();
        store
            .set_atomic(vec![
                (FieldName::AccessToken, "tok-A".into()),
                (FieldName::RefreshToken, "ref-B".into()),
            ])
            .unwrap();

        assert_eq!(store.get(FieldName::AccessToken).unwrap().unwrap().expose(), "tok-A");
        assert_eq!(store.get(FieldName::RefreshToken).unwrap().unwrap().expose(), "ref-B");
    }

    #[test]
    fn test_backend_never_sees_plaintext() {
        let store = memory_store();
        store
            .set_atomic(vec![(FieldName::UserEmail, "someone@example.com".into())])
            .unwrap();

        let sealed = store.backend.load("test.ns", &[FieldName::UserEmail]).unwrap();
        let raw = String::from_utf8_lossy(&sealed[0].1.ciphertext).to_string();
        assert!(!raw.contains("someone@example.com"));
    }

    #[test]
    fn test_snapshot_returns_only_present_fields() {
        let store = sqlite_store();
        store
            .set_atomic(vec![(FieldName::UserId, "42".into())])
            .unwrap();

        let record = store.snapshot(&FieldName::IDENTITY).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(FieldName::UserId).unwrap().expose(), "42");
        assert!(!record.contains(FieldName::UserEmail));
    }

    #[test]
    fn test_remove_absent_field_is_noop() {
        let store = memory_store();
        assert!(store.remove(&[FieldName::UserRoles]).is_ok());
    }

    #[test]
    fn test_remove_deletes_listed_fields_only() {
        let store = sqlite_store();
        store
            .set_atomic(vec![
                (FieldName::AccessToken, "a".into()),
                (FieldName::RefreshToken, "r".into()),
                (FieldName::BiometricEnabled, "true".into()),
            ])
            .unwrap();

        store.remove(&FieldName::TOKENS).unwrap();

        let record = store.snapshot(&FieldName::ALL).unwrap();
        assert_eq!(record.fields().collect::<Vec<_>>(), vec![FieldName::BiometricEnabled]);
    }

    #[test]
    fn test_clear_all_is_idempotent() {
        let store = sqlite_store();
        store
            .set_atomic(vec![(FieldName::AccessToken, "a".into())])
            .unwrap();

        store.clear_all().unwrap();
        store.clear_all().unwrap();
        assert!(store.snapshot(&FieldName::ALL).unwrap().is_empty());
    }

    #[test]
    fn test_tampered_value_is_decryption_error_not_absent() {
        let store = sqlite_store();
        store
            .set_atomic(vec![(FieldName::AccessToken, "tok-A".into())])
            .unwrap();

        tamper(&store.backend, FieldName::AccessToken);

        let err = store.get(FieldName::AccessToken).unwrap_err();
        assert!(matches!(err, StoreError::Decryption(FieldName::AccessToken)));
    }

    #[test]
    fn test_swapped_ciphertext_fails_under_other_field() {
        let store = memory_store();
        store
            .set_atomic(vec![(FieldName::RefreshToken, "ref-B".into())])
            .unwrap();

        let (_, sealed) = store
            .backend
            .load("test.ns", &[FieldName::RefreshToken])
            .unwrap()
            .pop()
            .unwrap();
        store
            .backend
            .commit("test.ns", &[SealedMutation::Put(FieldName::AccessToken, sealed)])
            .unwrap();

        assert!(matches!(
            store.get(FieldName::AccessToken),
            Err(StoreError::Decryption(FieldName::AccessToken))
        ));
        // The untouched original still decrypts.
        assert_eq!(store.get(FieldName::RefreshToken).unwrap().unwrap().expose(), "ref-B");
    }

    #[test]
    fn test_snapshot_fails_if_any_field_is_tampered() {
        let store = memory_store();
        store
            .set_atomic(vec![
                (FieldName::UserId, "1".into()),
                (FieldName::UserRoles, "admin".into()),
            ])
            .unwrap();
        tamper(&store.backend, FieldName::UserRoles);

        assert!(store.snapshot(&FieldName::IDENTITY).is_err());
    }

    #[test]
    fn test_other_key_cannot_read_store() {
        let backend = MemoryBackend::new();
        let writer = EncryptedRecordStore::new(backend, &key(), "test.ns");
        writer
            .set_atomic(vec![(FieldName::UserId, "7".into())])
            .unwrap();

        let stolen: Vec<(FieldName, SealedValue)> =
            writer.backend.load("test.ns", &FieldName::ALL).unwrap();
        let other_key = KeyHandle::from_bytes(&[6u8; KEY_LEN], KeyBacking::Software).unwrap();
        let reader = EncryptedRecordStore::new(MemoryBackend::new(), &other_key, "test.ns");
        reader
            .backend
            .commit(
                "test.ns",
                &stolen
                    .into_iter()
                    .map(|(f, s)| SealedMutation::Put(f, s))
                    .collect::<Vec<_>>(),
            )
            .unwrap();

        assert!(reader.get(FieldName::UserId).is_err());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let store = sqlite_store();
        assert!(store.apply(&[]).is_ok());
    }
}
