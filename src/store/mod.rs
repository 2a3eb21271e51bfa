// Tokenvault - Store Module
//
// Encrypted record storage. Each field is sealed independently with
// XChaCha20-Poly1305 under a field-bound subkey; backends (SQLite on disk,
// or memory) only ever hold ciphertext and commit batches atomically.

mod backend;
mod cipher;
mod db;
mod error;
mod models;
mod repository;

pub use backend::{MemoryBackend, RecordBackend};
pub use cipher::{FieldCipher, NONCE_LEN};
pub use db::Database;
pub use error::StoreError;
pub use models::{
    CredentialRecord, FieldName, Mutation, SealedMutation, SealedValue, SecretValue,
};
pub use repository::{EncryptedRecordStore, RecordStore};
